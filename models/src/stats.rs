// models/src/stats.rs
use serde::{Deserialize, Serialize};

/// Summary counts for the staff dashboard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_patients: u64,
    pub appointments_today: u64,
    pub total_appointments: u64,
    pub total_doctors: u64,
}
