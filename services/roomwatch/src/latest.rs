//! Latest-reading resolution

use std::collections::HashMap;
use std::sync::Arc;

use crate::model::Measurement;
use crate::store::MeasurementStore;

/// Pick the most recent reading per sensor.
///
/// Greatest timestamp wins; equal timestamps fall back to the larger
/// insertion sequence, so the result does not depend on input order.
pub fn latest_by_sensor<'a, I>(measurements: I) -> HashMap<String, Measurement>
where
    I: IntoIterator<Item = &'a Measurement>,
{
    let mut latest: HashMap<String, &Measurement> = HashMap::new();
    for m in measurements {
        latest
            .entry(m.sensor_id.clone())
            .and_modify(|current| {
                if m.recency() > current.recency() {
                    *current = m;
                }
            })
            .or_insert(m);
    }
    latest
        .into_iter()
        .map(|(id, m)| (id, m.clone()))
        .collect()
}

/// Resolves the latest reading of a set of sensors
#[derive(Clone)]
pub struct LatestResolver {
    store: Arc<dyn MeasurementStore>,
}

impl LatestResolver {
    pub fn new(store: Arc<dyn MeasurementStore>) -> Self {
        Self { store }
    }

    /// Every requested id maps to its latest reading, or `None` if the sensor
    /// has never reported. Ids the store returns that were not asked for are
    /// dropped.
    pub async fn latest(
        &self,
        sensor_ids: &[String],
    ) -> crate::Result<HashMap<String, Option<Measurement>>> {
        let mut found = self.store.fetch_latest_per_sensor(sensor_ids).await?;

        let resolved: HashMap<String, Option<Measurement>> = sensor_ids
            .iter()
            .map(|id| (id.clone(), found.remove(id)))
            .collect();

        if !found.is_empty() {
            tracing::debug!(
                "Store returned {} readings for sensors that were not requested",
                found.len()
            );
        }
        tracing::debug!(
            "Resolved latest readings: {} requested, {} present",
            resolved.len(),
            resolved.values().filter(|m| m.is_some()).count()
        );
        Ok(resolved)
    }
}
