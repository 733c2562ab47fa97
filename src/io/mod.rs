// Purpose - panel capabilities: jacks, buttons, the expander link

pub mod button;
pub mod ports;
pub mod serial;
pub mod virt;

pub use button::{Press, PushButton};
pub use ports::{AnalogOutput, ContinuousInput, DigitalOutput, LevelInput};
