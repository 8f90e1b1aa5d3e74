//! sea-orm entities for the field operations schema.

pub mod attendance_count;
pub mod report;
pub mod work_order;

pub use work_order::WorkOrderStatus;
