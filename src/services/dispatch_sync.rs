use crate::{
    dispatch::{completion_is_usable, completion_key, run_in_batches, BatchStats, DispatchApi},
    errors::ServiceError,
    normalize::first_string,
    services::imports::{ImportService, ImportSummary},
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct SearchWithCompletionRequest {
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
    /// Continuation tag from the previous page
    pub after_tag: Option<String>,
    /// How many orders the caller has already collected from earlier pages
    #[serde(default)]
    pub previously_collected: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PaginationProgress {
    pub is_complete: bool,
    pub after_tag: Option<String>,
    pub total_collected: usize,
    pub previously_collected: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct FilteringMetadata {
    pub unfiltered_order_count: usize,
    pub filtered_order_count: usize,
    pub completion_detail_count: usize,
}

/// One search page with completion details merged into each order.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct OrdersWithCompletion {
    #[schema(value_type = Vec<Object>)]
    pub orders: Vec<Value>,
    pub total_count: usize,
    /// Orders that came back with a completion
    pub filtered_count: usize,
    pub after_tag: Option<String>,
    pub pagination_progress: PaginationProgress,
    pub filtering_metadata: FilteringMetadata,
    pub batch_stats: BatchStats,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct AutoImportOutcome {
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
    pub pages: usize,
    pub orders_seen: usize,
    pub orders_with_completion: usize,
    /// False when the page cap stopped the walk early
    pub is_complete: bool,
    pub summary: ImportSummary,
}

/// Pulls orders from the dispatch search API and joins them with their
/// completion details.
#[derive(Clone)]
pub struct DispatchSyncService {
    dispatch: Arc<dyn DispatchApi>,
    imports: ImportService,
    batch_size: usize,
    batch_delay: Duration,
    max_search_pages: u32,
}

impl DispatchSyncService {
    pub fn new(
        dispatch: Arc<dyn DispatchApi>,
        imports: ImportService,
        batch_size: usize,
        batch_delay: Duration,
        max_search_pages: u32,
    ) -> Self {
        Self {
            dispatch,
            imports,
            batch_size,
            batch_delay,
            max_search_pages,
        }
    }

    /// Fetches one search page and merges completion details into each order as
    /// `completion_response: {orders: [entry]}`.
    #[instrument(skip(self), fields(from = %from, to = %to))]
    pub async fn search_with_completion(
        &self,
        from: NaiveDate,
        to: NaiveDate,
        after_tag: Option<String>,
        previously_collected: usize,
    ) -> Result<OrdersWithCompletion, ServiceError> {
        if from > to {
            return Err(ServiceError::ValidationError(
                "date_from must not be after date_to".to_string(),
            ));
        }

        let page = self.dispatch.search_orders(from, to, after_tag).await?;
        let unfiltered_order_count = page.orders.len();

        let order_nos: Vec<String> = page
            .orders
            .iter()
            .filter_map(|order| first_string(order, &["/data/orderNo", "/orderNo"]))
            .collect();

        let (envelopes, batch_stats) =
            run_in_batches(&order_nos, self.batch_size, self.batch_delay, |chunk| async move {
                self.dispatch.get_completion_details(chunk).await
            })
            .await;
        if batch_stats.failed_batches > 0 {
            warn!(
                failed = batch_stats.failed_batches,
                "Some completion detail batches failed"
            );
        }

        let completion_detail_count = envelopes.iter().map(|e| e.orders.len()).sum();
        let completions: HashMap<String, Value> = envelopes
            .into_iter()
            .flat_map(|envelope| envelope.orders)
            .filter(completion_is_usable)
            .filter_map(|entry| completion_key(&entry).map(|key| (key, entry)))
            .collect();

        let orders: Vec<Value> = page
            .orders
            .into_iter()
            .map(|mut order| {
                let entry = first_string(&order, &["/data/orderNo", "/orderNo"])
                    .and_then(|no| completions.get(&no).cloned());
                if let (Some(entry), Some(obj)) = (entry, order.as_object_mut()) {
                    obj.insert("completion_response".to_string(), json!({ "orders": [entry] }));
                }
                order
            })
            .collect();

        let filtered_count = orders
            .iter()
            .filter(|o| o.get("completion_response").is_some())
            .count();
        let total_count = orders.len();

        Ok(OrdersWithCompletion {
            orders,
            total_count,
            filtered_count,
            after_tag: page.after_tag.clone(),
            pagination_progress: PaginationProgress {
                is_complete: page.after_tag.is_none(),
                after_tag: page.after_tag,
                total_collected: previously_collected + total_count,
                previously_collected,
            },
            filtering_metadata: FilteringMetadata {
                unfiltered_order_count,
                filtered_order_count: filtered_count,
                completion_detail_count,
            },
            batch_stats,
        })
    }

    /// Walks every search page in the range (up to the page cap) and imports the
    /// orders that have a completion.
    #[instrument(skip(self), fields(from = %from, to = %to))]
    pub async fn auto_import(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<AutoImportOutcome, ServiceError> {
        let mut after_tag: Option<String> = None;
        let mut completed: Vec<Value> = Vec::new();
        let mut orders_seen = 0;
        let mut pages = 0;
        let mut is_complete = false;

        while pages < self.max_search_pages as usize {
            let page = self
                .search_with_completion(from, to, after_tag.take(), orders_seen)
                .await?;
            pages += 1;
            orders_seen += page.total_count;
            completed.extend(
                page.orders
                    .into_iter()
                    .filter(|o| o.get("completion_response").is_some()),
            );

            match page.after_tag {
                Some(tag) => after_tag = Some(tag),
                None => {
                    is_complete = true;
                    break;
                }
            }
        }
        if !is_complete {
            warn!(pages, "Stopped following search pages at the page cap");
        }

        let orders_with_completion = completed.len();
        let summary = if completed.is_empty() {
            ImportSummary {
                success: true,
                ..Default::default()
            }
        } else {
            self.imports.import_orders(&completed).await?
        };

        info!(
            pages,
            orders_seen,
            orders_with_completion,
            imported = summary.imported,
            duplicates = summary.duplicates,
            "Auto-import finished"
        );

        Ok(AutoImportOutcome {
            date_from: from,
            date_to: to,
            pages,
            orders_seen,
            orders_with_completion,
            is_complete,
            summary,
        })
    }
}
