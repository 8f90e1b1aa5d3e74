pub mod attendance;
pub mod common;
pub mod dispatch;
pub mod jobs;
pub mod materials;
pub mod reports;
pub mod work_orders;

use crate::{
    config::AppConfig,
    db::DbPool,
    dispatch::DispatchApi,
    events::EventSender,
    jobs::JobBoard,
    services::{
        attendance::AttendanceService, dispatch_sync::DispatchSyncService,
        imports::ImportService, materials::MaterialsService, reports::ReportService,
        work_orders::WorkOrderService,
    },
};
use std::sync::Arc;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub work_orders: Arc<WorkOrderService>,
    pub imports: Arc<ImportService>,
    pub dispatch_sync: Arc<DispatchSyncService>,
    pub reports: Arc<ReportService>,
    pub materials: Arc<MaterialsService>,
    pub attendance: Arc<AttendanceService>,
    pub dispatch: Arc<dyn DispatchApi>,
    pub jobs: JobBoard,
}

impl AppServices {
    /// Wires every service against one pool, one dispatch client and the
    /// batching limits from `config`.
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: Option<Arc<EventSender>>,
        dispatch: Arc<dyn DispatchApi>,
        config: &AppConfig,
    ) -> Self {
        let batch_size = config.dispatch.batch_size;
        let batch_delay = config.dispatch.batch_delay();

        let imports = ImportService::new(db_pool.clone(), event_sender.clone());
        let dispatch_sync = DispatchSyncService::new(
            dispatch.clone(),
            imports.clone(),
            batch_size,
            batch_delay,
            config.dispatch.max_search_pages,
        );
        let reports = ReportService::new(
            db_pool.clone(),
            dispatch.clone(),
            event_sender.clone(),
            config.org_id.clone(),
            batch_size,
            batch_delay,
        );

        Self {
            work_orders: Arc::new(WorkOrderService::new(
                db_pool.clone(),
                event_sender.clone(),
                config.api_default_page_size,
                config.api_max_page_size,
            )),
            imports: Arc::new(imports),
            dispatch_sync: Arc::new(dispatch_sync),
            reports: Arc::new(reports),
            materials: Arc::new(MaterialsService::new(dispatch.clone(), batch_size, batch_delay)),
            attendance: Arc::new(AttendanceService::new(db_pool, event_sender)),
            dispatch,
            jobs: JobBoard::new(),
        }
    }
}
