pub mod enums;
pub mod reading;
pub mod subject;

pub use enums::{RiskProfile, Sex};
pub use reading::*;
pub use subject::*;
