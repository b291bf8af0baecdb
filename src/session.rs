//! Application session on the receiver device.
//!
//! A session is only recorded once negotiation has fully succeeded, so its
//! presence doubles as the "initialized" flag: commands either see a
//! complete session or none at all.

use crate::{
    error::{Error, Result},
    protocol::messages::ReceiverStatusMessage,
};

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Session {
    /// Destination id of the running application.
    pub transport_id: String,

    /// Identifies the launched application instance.
    pub session_id: String,
}

impl Session {
    /// Extracts the session of the foreground application.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no application is listed, or it lacks a
    /// transport or session id.
    pub fn from_status(status: &ReceiverStatusMessage) -> Result<Self> {
        let app = status
            .application()
            .ok_or_else(|| Error::not_found("no application running"))?;

        match (&app.transport_id, &app.session_id) {
            (Some(transport_id), Some(session_id)) => Ok(Self {
                transport_id: transport_id.clone(),
                session_id: session_id.clone(),
            }),
            _ => Err(Error::not_found(format!(
                "transport id and session id of {} not found",
                app.app_id
            ))),
        }
    }
}

/// Whether `app_id` is the foreground application.
#[must_use]
pub fn is_running(status: &ReceiverStatusMessage, app_id: &str) -> bool {
    status
        .application()
        .is_some_and(|app| app.app_id == app_id)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn session_comes_from_the_first_application() {
        let status = ReceiverStatusMessage::from_value(&json!({
            "type": "RECEIVER_STATUS",
            "status": {"applications": [
                {"appId": "CC1AD845", "sessionId": "s-1", "transportId": "t-1"},
                {"appId": "233637DE", "sessionId": "s-2", "transportId": "t-2"}
            ]}
        }))
        .unwrap();

        assert!(is_running(&status, "CC1AD845"));
        assert!(!is_running(&status, "233637DE"));
        assert_eq!(
            Session::from_status(&status).unwrap(),
            Session {
                transport_id: "t-1".to_owned(),
                session_id: "s-1".to_owned(),
            }
        );
    }

    #[test]
    fn missing_descriptors_are_not_found() {
        let idle = ReceiverStatusMessage::from_value(&json!({"status": {}})).unwrap();
        assert!(!is_running(&idle, "CC1AD845"));
        assert_eq!(
            Session::from_status(&idle).unwrap_err().kind,
            ErrorKind::NotFound
        );

        let partial = ReceiverStatusMessage::from_value(&json!({
            "status": {"applications": [{"appId": "CC1AD845", "sessionId": "s-1"}]}
        }))
        .unwrap();
        assert_eq!(
            Session::from_status(&partial).unwrap_err().kind,
            ErrorKind::NotFound
        );
    }
}
