pub mod audit_entry;
pub mod enums;
pub mod lab_parameter;
pub mod normalized;
pub mod reference;

pub use audit_entry::*;
pub use enums::*;
pub use lab_parameter::*;
pub use normalized::*;
pub use reference::*;
