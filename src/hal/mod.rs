//! Hardware collaborators of the control loop: the millisecond tick, the
//! rain gauge switch input and the run indicator output.

pub mod clock;
pub mod digital_input;
pub mod digital_output;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use digital_input::{DigitalInput, SimulatedInput, SysfsGpioInput};
pub use digital_output::{DigitalOutput, RunIndicator, SimulatedOutput, SysfsGpioOutput};
