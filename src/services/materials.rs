use crate::{
    dispatch::{run_in_batches, BatchStats, DispatchApi, PLACEHOLDER_ORDER_NO},
    errors::ServiceError,
    normalize::first_string,
};
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

pub const MULTIPLE_DRIVERS: &str = "Multiple Drivers";

/// Matches `(15) FREEZER` entries in a comma separated notes line.
static MATERIAL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\((\d+)\)\s*([^,(]+)(?:,|$)").expect("valid material pattern"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct MaterialItem {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub material_type: String,
    pub quantity: u64,
    pub work_order_id: String,
    pub driver_serial: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct MaterialTotal {
    #[serde(rename = "type")]
    pub material_type: String,
    pub quantity: u64,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct MaterialsQuery {
    pub date: NaiveDate,
    pub driver_serial: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct MaterialsRequirement {
    pub date: NaiveDate,
    pub technician_name: Option<String>,
    pub items: Vec<MaterialItem>,
    pub totals: Vec<MaterialTotal>,
    /// `"orderNo: notes"` for every order that had notes
    pub raw_notes: Vec<String>,
    pub order_count: usize,
    pub batch_stats: BatchStats,
}

/// Parses `"(0) COOLER, (15) FREEZER, (2) G2063B"` style notes. Zero
/// quantities and blank types are dropped.
pub fn parse_materials_from_notes(
    notes: &str,
    order_no: &str,
    driver_serial: Option<&str>,
) -> Vec<MaterialItem> {
    MATERIAL_PATTERN
        .captures_iter(notes)
        .filter_map(|caps| {
            let material_type = caps.get(2)?.as_str().trim();
            let raw_quantity = caps.get(1)?.as_str();
            let Ok(quantity) = raw_quantity.parse::<u64>() else {
                warn!(
                    order_no,
                    quantity = raw_quantity,
                    material_type,
                    "Skipping material entry with an out of range quantity"
                );
                return None;
            };
            if quantity == 0 || material_type.is_empty() {
                return None;
            }
            Some(MaterialItem {
                id: Uuid::new_v4(),
                material_type: material_type.to_string(),
                quantity,
                work_order_id: order_no.to_string(),
                driver_serial: driver_serial.map(str::to_string),
            })
        })
        .collect()
}

/// Sums quantities per material type, sorted by type.
pub fn totals_by_type(items: &[MaterialItem]) -> Vec<MaterialTotal> {
    let mut totals: BTreeMap<&str, u64> = BTreeMap::new();
    for item in items {
        let total = totals.entry(item.material_type.as_str()).or_default();
        *total = total.saturating_add(item.quantity);
    }
    totals
        .into_iter()
        .map(|(material_type, quantity)| MaterialTotal {
            material_type: material_type.to_string(),
            quantity,
        })
        .collect()
}

#[derive(Clone)]
pub struct MaterialsService {
    dispatch: Arc<dyn DispatchApi>,
    batch_size: usize,
    batch_delay: Duration,
}

impl MaterialsService {
    pub fn new(dispatch: Arc<dyn DispatchApi>, batch_size: usize, batch_delay: Duration) -> Self {
        Self {
            dispatch,
            batch_size,
            batch_delay,
        }
    }

    /// Material requirements for every route on `date`, optionally narrowed to
    /// one driver.
    #[instrument(skip(self), fields(date = %date))]
    pub async fn requirements_for_date(
        &self,
        date: NaiveDate,
        driver_serial: Option<&str>,
    ) -> Result<MaterialsRequirement, ServiceError> {
        let mut routes = self.dispatch.get_routes(date).await?;
        if let Some(serial) = driver_serial.filter(|s| !s.is_empty()) {
            routes
                .routes
                .retain(|route| route.driver_serial.as_deref() == Some(serial));
        }

        let technician_name = match routes.routes.as_slice() {
            [] => None,
            [only] => only.driver_name.clone(),
            _ => Some(MULTIPLE_DRIVERS.to_string()),
        };

        let mut driver_by_order: HashMap<String, Option<String>> = HashMap::new();
        let mut order_nos: Vec<String> = Vec::new();
        for route in &routes.routes {
            for stop in &route.stops {
                let Some(no) = stop.order_no.as_deref() else {
                    continue;
                };
                if no == PLACEHOLDER_ORDER_NO || no.trim().is_empty() {
                    continue;
                }
                if driver_by_order
                    .insert(no.to_string(), route.driver_serial.clone())
                    .is_none()
                {
                    order_nos.push(no.to_string());
                }
            }
        }

        if order_nos.is_empty() {
            warn!("No order numbers found in routes");
            return Ok(MaterialsRequirement {
                date,
                technician_name,
                ..Default::default()
            });
        }

        let (envelopes, batch_stats) =
            run_in_batches(&order_nos, self.batch_size, self.batch_delay, |chunk| async move {
                self.dispatch.get_orders(chunk).await
            })
            .await;

        let mut items = Vec::new();
        let mut raw_notes = Vec::new();
        let mut order_count = 0;
        for order in envelopes.iter().flat_map(|envelope| envelope.orders.iter()) {
            order_count += 1;
            let Some(order_no) = first_string(order, &["/data/orderNo", "/orderNo"]) else {
                continue;
            };
            let Some(notes) = first_string(order, &["/data/notes", "/notes"]) else {
                continue;
            };
            raw_notes.push(format!("{}: {}", order_no, notes));
            let serial = driver_by_order.get(&order_no).cloned().flatten();
            items.extend(parse_materials_from_notes(&notes, &order_no, serial.as_deref()));
        }

        let totals = totals_by_type(&items);
        info!(
            items = items.len(),
            orders = order_count,
            "Found material items"
        );

        Ok(MaterialsRequirement {
            date,
            technician_name,
            items,
            totals,
            raw_notes,
            order_count,
            batch_stats,
        })
    }
}
