// Review workflow
pub mod imports;
pub mod work_orders;

// Dispatch-backed services
pub mod dispatch_sync;
pub mod materials;
pub mod reports;

// Crew tracking
pub mod attendance;
