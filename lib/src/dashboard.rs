// lib/src/dashboard.rs
use chrono::{DateTime, Utc};
use std::sync::Arc;

use models::errors::PortalResult;
use models::stats::DashboardStats;
use models::timestamps::{local_day_bounds, Zone};

use crate::storage_engine::DirectoryStore;
use crate::util::CallLimits;

#[derive(Clone)]
pub struct DashboardAggregator {
    store: Arc<dyn DirectoryStore>,
    limits: CallLimits,
    server_zone: Zone,
}

impl DashboardAggregator {
    pub fn new(store: Arc<dyn DirectoryStore>, limits: CallLimits, server_zone: Zone) -> Self {
        DashboardAggregator {
            store,
            limits,
            server_zone,
        }
    }

    /// Headline counts. "Today" is the current calendar day in `zone`, or in
    /// the server's zone when the caller sends none.
    pub async fn stats(&self, zone: Option<Zone>) -> PortalResult<DashboardStats> {
        self.stats_at(Utc::now(), zone.unwrap_or(self.server_zone)).await
    }

    pub async fn stats_at(&self, now: DateTime<Utc>, zone: Zone) -> PortalResult<DashboardStats> {
        let (start, end) = local_day_bounds(now, zone);
        let (total_patients, appointments_today, total_appointments, total_doctors) = tokio::try_join!(
            self.limits.run("patient count", self.store.count_patients()),
            self.limits.run(
                "appointment count",
                self.store.count_appointments_between(start, end)
            ),
            self.limits.run("appointment count", self.store.count_appointments()),
            self.limits.run("doctor count", self.store.count_doctors()),
        )?;
        Ok(DashboardStats {
            total_patients,
            appointments_today,
            total_appointments,
            total_doctors,
        })
    }
}
