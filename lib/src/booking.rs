// lib/src/booking.rs
//! Public self-registration with a first appointment, and staff bookings for
//! patients already in the directory.

use log::{error, info};
use std::sync::Arc;
use uuid::Uuid;

use models::errors::{BookingStage, PortalError, PortalResult, ValidationError};
use models::medical::{
    Appointment, AppointmentRequest, BookingRequest, Caller, Doctor, IdentityAccount, NewAppointment, Patient, Role,
};
use models::timestamps::Zone;
use security::{AccountRegistration, IdentityOracle, Permission, RolesConfig, UserLogin};

use crate::notifications::{Notification, Notifier};
use crate::storage_engine::DirectoryStore;
use crate::util::CallLimits;

/// What a successful public booking produced.
#[derive(Debug, Clone)]
pub struct BookingOutcome {
    pub account: IdentityAccount,
    pub patient: Patient,
    pub appointment: Appointment,
}

#[derive(Clone)]
pub struct BookingEngine {
    store: Arc<dyn DirectoryStore>,
    identity: Arc<dyn IdentityOracle>,
    notifier: Notifier,
    roles: Arc<RolesConfig>,
    limits: CallLimits,
    zone: Zone,
}

impl BookingEngine {
    pub fn new(
        store: Arc<dyn DirectoryStore>,
        identity: Arc<dyn IdentityOracle>,
        notifier: Notifier,
        roles: Arc<RolesConfig>,
        limits: CallLimits,
        zone: Zone,
    ) -> Self {
        BookingEngine {
            store,
            identity,
            notifier,
            roles,
            limits,
            zone,
        }
    }

    /// Registers a patient account and books its first appointment.
    ///
    /// Every validation rule runs before anything is written. Once the
    /// account exists a later failure is reported as
    /// [`PortalError::PartialBookingFailure`]; the account stays usable and
    /// the same request can be sent again to finish the booking.
    pub async fn book(&self, request: BookingRequest) -> PortalResult<BookingOutcome> {
        request.check_credentials()?;
        let doctor = self.resolve_doctor(&request.doctor_id).await?;
        let details = request.check_fields(self.zone)?;

        let created = self
            .limits
            .run(
                "account creation",
                self.identity.create_account(AccountRegistration {
                    email: details.email.clone(),
                    password: request.password.clone(),
                    role: Role::Patient,
                    name: details.patient.name.clone(),
                }),
            )
            .await;
        let account = match created {
            Ok(account) => account,
            Err(PortalError::AccountExists(email)) => self.resume_incomplete_booking(&email, &request.password).await?,
            Err(e) => return Err(e),
        };

        let patient = self
            .limits
            .run(
                "patient upsert",
                self.store.upsert_patient_by_email(&details.email, details.patient.clone()),
            )
            .await
            .map_err(|e| partial_failure(&account, BookingStage::PatientUpsert, e))?;

        let appointment = Appointment::from_new(NewAppointment {
            patient_id: patient.id,
            doctor_name: doctor.name.clone(),
            doctor_specialty: Some(doctor.specialty.clone()),
            appointment_date: details.appointment_date,
            reason: details.reason.clone(),
        });
        let appointment = self
            .limits
            .run("appointment insert", self.store.insert_appointment(appointment))
            .await
            .map_err(|e| partial_failure(&account, BookingStage::AppointmentInsert, e))?;

        info!(
            "Booked appointment {} with {} for patient {}",
            appointment.id, appointment.doctor_name, patient.id
        );
        self.notifier.dispatch(Notification::appointment_confirmation(
            &details.email,
            &patient.name,
            &appointment,
            self.zone,
        ));

        Ok(BookingOutcome {
            account,
            patient,
            appointment,
        })
    }

    /// Staff booking for an existing patient. The confirmation goes to the
    /// email on the request, else the patient's own email.
    pub async fn book_for_patient(&self, caller: &Caller, request: AppointmentRequest) -> PortalResult<Appointment> {
        self.roles.require(caller, Permission::AppointmentsCreate)?;
        let mut new_appointment = request.to_new_appointment(self.zone)?;

        let patient = self
            .limits
            .run("patient lookup", self.store.get_patient(&request.patient_id))
            .await?
            .ok_or_else(|| ValidationError::UnknownPatient(request.patient_id.to_string()))?;

        let doctors = self.limits.run("doctor listing", self.store.list_doctors()).await?;
        new_appointment.doctor_specialty = doctors
            .iter()
            .find(|d| d.name.eq_ignore_ascii_case(&new_appointment.doctor_name))
            .map(|d| d.specialty.clone());

        let appointment = self
            .limits
            .run(
                "appointment insert",
                self.store.insert_appointment(Appointment::from_new(new_appointment)),
            )
            .await?;
        info!("{} booked appointment {} for patient {}", caller.email, appointment.id, patient.id);

        if let Some(to) = request.notification_email().or_else(|| patient.email.clone()) {
            self.notifier.dispatch(Notification::appointment_confirmation(
                &to,
                &patient.name,
                &appointment,
                self.zone,
            ));
        }
        Ok(appointment)
    }

    /// A booking that stopped after the account was created may be submitted
    /// again. The retry must carry the account's password, the account must
    /// be a patient's, and no appointment may exist for its patient row yet.
    /// Anything else stays `AccountExists`.
    async fn resume_incomplete_booking(&self, email: &str, password: &str) -> PortalResult<IdentityAccount> {
        let exists = || PortalError::AccountExists(email.to_string());
        let signed_in = self
            .limits
            .run(
                "sign in",
                self.identity.sign_in(UserLogin {
                    email: email.to_string(),
                    password: password.to_string(),
                }),
            )
            .await;
        let session = match signed_in {
            Ok(session) => session,
            Err(PortalError::Unauthenticated(_)) => return Err(exists()),
            Err(e) => return Err(e),
        };
        if session.role != Role::Patient {
            return Err(exists());
        }

        let patient = self
            .limits
            .run("patient lookup", self.store.find_patient_by_email(email))
            .await?;
        if let Some(patient) = patient {
            let booked = self
                .limits
                .run("appointment listing", self.store.appointments_for_patient(&patient.id))
                .await?;
            if !booked.is_empty() {
                return Err(exists());
            }
        }

        let account = self
            .limits
            .run("account lookup", self.identity.find_account(email))
            .await?
            .ok_or_else(exists)?;
        info!("Resuming incomplete booking for {} (user {})", account.email, account.user_id);
        Ok(account)
    }

    async fn resolve_doctor(&self, doctor_id: &str) -> PortalResult<Doctor> {
        let unknown = || ValidationError::UnknownDoctor(doctor_id.trim().to_string());
        let id = Uuid::parse_str(doctor_id.trim()).map_err(|_| unknown())?;
        self.limits
            .run("doctor lookup", self.store.get_doctor(&id))
            .await?
            .ok_or_else(|| unknown().into())
    }
}

fn partial_failure(account: &IdentityAccount, stage: BookingStage, cause: PortalError) -> PortalError {
    error!(
        "Booking for {} (user {}) stopped at {} stage after account creation: {}",
        account.email, account.user_id, stage, cause
    );
    PortalError::PartialBookingFailure {
        email: account.email.clone(),
        user_id: account.user_id,
        stage,
        reason: cause.to_string(),
    }
}
