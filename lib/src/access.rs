// lib/src/access.rs
//! Decides which appointments and records a caller may see.

use log::{debug, warn};
use std::collections::HashMap;
use std::sync::Arc;

use models::errors::PortalResult;
use models::medical::{AppointmentView, Caller, MedicalRecord, Patient, Role};

use crate::storage_engine::DirectoryStore;
use crate::util::{non_blank, CallLimits};

/// The name a caller goes by in appointment rows: the doctor directory entry
/// for their email, else the display name from their session. A failed
/// directory lookup resolves to nothing.
pub async fn resolve_display_name(
    store: &dyn DirectoryStore,
    limits: &CallLimits,
    caller: &Caller,
) -> Option<String> {
    if caller.email.trim().is_empty() {
        return non_blank(caller.display_name.as_deref());
    }
    match limits.run("doctor lookup", store.find_doctor_by_email(&caller.email)).await {
        Ok(doctor) => doctor
            .and_then(|d| non_blank(Some(&d.name)))
            .or_else(|| non_blank(caller.display_name.as_deref())),
        Err(e) => {
            warn!("Could not resolve display name for {}: {}", caller.email, e);
            None
        }
    }
}

#[derive(Clone)]
pub struct AccessScoper {
    store: Arc<dyn DirectoryStore>,
    limits: CallLimits,
}

impl AccessScoper {
    pub fn new(store: Arc<dyn DirectoryStore>, limits: CallLimits) -> Self {
        AccessScoper { store, limits }
    }

    /// Admins see every appointment, doctors those booked under their name,
    /// patients their own. Anyone else sees none. Ordered by date.
    pub async fn visible_appointments(&self, caller: &Caller) -> PortalResult<Vec<AppointmentView>> {
        let mut views = match caller.role {
            None => return Ok(Vec::new()),
            Some(Role::Admin) => self.all_appointments().await?,
            Some(Role::Doctor) => match resolve_display_name(self.store.as_ref(), &self.limits, caller).await {
                Some(name) => {
                    let needle = name.to_lowercase();
                    self.all_appointments()
                        .await?
                        .into_iter()
                        .filter(|v| v.appointment.doctor_name.to_lowercase().contains(&needle))
                        .collect()
                }
                None => {
                    debug!("Doctor {} has no resolvable name; no appointments visible", caller.email);
                    Vec::new()
                }
            },
            Some(Role::Patient) => self.own_appointments(caller).await?,
        };
        views.sort_by(|a, b| a.appointment.appointment_date.cmp(&b.appointment.appointment_date));
        Ok(views)
    }

    /// Only patients see records, and only those filed under their email.
    pub async fn visible_records(&self, caller: &Caller) -> PortalResult<Vec<MedicalRecord>> {
        if caller.role != Some(Role::Patient) || caller.email.trim().is_empty() {
            return Ok(Vec::new());
        }
        self.limits
            .run("record listing", self.store.records_for_email(&caller.email))
            .await
    }

    async fn all_appointments(&self) -> PortalResult<Vec<AppointmentView>> {
        let appointments = self
            .limits
            .run("appointment listing", self.store.list_appointments())
            .await?;
        let patients: HashMap<_, Patient> = self
            .limits
            .run("patient listing", self.store.list_patients())
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();
        Ok(appointments
            .into_iter()
            .map(|a| {
                let patient = patients.get(&a.patient_id);
                AppointmentView::join(a, patient)
            })
            .collect())
    }

    async fn own_appointments(&self, caller: &Caller) -> PortalResult<Vec<AppointmentView>> {
        if caller.email.trim().is_empty() {
            return Ok(Vec::new());
        }
        let Some(patient) = self
            .limits
            .run("patient lookup", self.store.find_patient_by_email(&caller.email))
            .await?
        else {
            return Ok(Vec::new());
        };
        let appointments = self
            .limits
            .run("appointment listing", self.store.appointments_for_patient(&patient.id))
            .await?;
        Ok(appointments
            .into_iter()
            .map(|a| AppointmentView::join(a, Some(&patient)))
            .collect())
    }
}
