//! Consultation requests and their lifecycle.
//!
//! ```text
//! open ──take──▶ taken ──propose──▶ time_proposed ──accept──▶ scheduled
//!   ▲              ▲ │                   │
//!   └──return──────┤ └──accept client────┼──────────────────▶ scheduled
//!                  └──────counter────────┘
//! {open, taken, time_proposed} ──client cancel──▶ cancelled
//! {open, taken, time_proposed, scheduled} ──admin cancel──▶ cancelled
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Open,
    Taken,
    TimeProposed,
    Scheduled,
    Cancelled,
}

impl RequestStatus {
    pub const ALL: [RequestStatus; 5] = [
        Self::Open,
        Self::Taken,
        Self::TimeProposed,
        Self::Scheduled,
        Self::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Taken => "taken",
            Self::TimeProposed => "time_proposed",
            Self::Scheduled => "scheduled",
            Self::Cancelled => "cancelled",
        }
    }

    /// Human-readable label for chat listings.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Open => "Open",
            Self::Taken => "In progress",
            Self::TimeProposed => "Waiting for time confirmation",
            Self::Scheduled => "Consultation scheduled",
            Self::Cancelled => "Cancelled",
        }
    }

    /// Whether a request in this status must have an assigned consultant.
    pub fn has_consultant(&self) -> bool {
        matches!(self, Self::Taken | Self::TimeProposed | Self::Scheduled)
    }

    /// Validate `transition` from this status and return the resulting status.
    pub fn apply(self, transition: &RequestTransition) -> Result<RequestStatus, IllegalTransition> {
        use RequestStatus::*;
        use RequestTransition as T;
        let target = match (self, transition) {
            (Open, T::Take { .. }) => Taken,
            (Taken, T::ProposeTime { .. }) => TimeProposed,
            (TimeProposed, T::AcceptProposedTime) => Scheduled,
            (TimeProposed, T::CounterOffer { .. }) => Taken,
            (Taken, T::AcceptClientTime) => Scheduled,
            (Open | Taken | TimeProposed, T::ClientCancel) => Cancelled,
            (Open | Taken | TimeProposed | Scheduled, T::AdminCancel) => Cancelled,
            (Taken | TimeProposed, T::ReturnToPool) => Open,
            _ => {
                return Err(IllegalTransition {
                    from: self,
                    transition: transition.name(),
                });
            }
        };
        Ok(target)
    }
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RequestStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(Self::Open),
            "taken" => Ok(Self::Taken),
            "time_proposed" => Ok(Self::TimeProposed),
            "scheduled" => Ok(Self::Scheduled),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(format!("Unknown request status: {}", s)),
        }
    }
}

/// A move in the request lifecycle, carrying the data it writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestTransition {
    Take { consultant_id: i64 },
    ProposeTime { time: String },
    AcceptProposedTime,
    CounterOffer { time: String },
    AcceptClientTime,
    ClientCancel,
    AdminCancel,
    ReturnToPool,
}

impl RequestTransition {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Take { .. } => "take",
            Self::ProposeTime { .. } => "propose_time",
            Self::AcceptProposedTime => "accept_proposed_time",
            Self::CounterOffer { .. } => "counter_offer",
            Self::AcceptClientTime => "accept_client_time",
            Self::ClientCancel => "client_cancel",
            Self::AdminCancel => "admin_cancel",
            Self::ReturnToPool => "return_to_pool",
        }
    }
}

/// A transition that the lifecycle table does not allow.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cannot {transition} a request that is {from}")]
pub struct IllegalTransition {
    pub from: RequestStatus,
    pub transition: &'static str,
}

/// A client's ask for a consultation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsultationRequest {
    pub id: i64,
    pub client_id: i64,
    pub topic: String,
    pub preferred_time: Option<String>,
    pub details: Option<String>,
    pub status: RequestStatus,
    pub consultant_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl ConsultationRequest {
    pub fn is_owned_by(&self, account_id: i64) -> bool {
        self.client_id == account_id
    }

    pub fn is_assigned_to(&self, account_id: i64) -> bool {
        self.consultant_id == Some(account_id)
    }

    /// Build the patch that performs `transition` from the current status.
    ///
    /// Keeps the consultant invariant: the consultant is set when entering
    /// `taken` from the pool and cleared whenever the request leaves the
    /// assigned states.
    pub fn plan(&self, transition: &RequestTransition) -> Result<RequestPatch, IllegalTransition> {
        let target = self.status.apply(transition)?;
        let mut patch = RequestPatch {
            status: Some(target),
            ..Default::default()
        };
        match transition {
            RequestTransition::Take { consultant_id } => {
                patch.consultant_id = Some(Some(*consultant_id));
            }
            RequestTransition::ProposeTime { time } | RequestTransition::CounterOffer { time } => {
                patch.preferred_time = Some(Some(time.clone()));
            }
            _ => {}
        }
        if !target.has_consultant() && self.consultant_id.is_some() {
            patch.consultant_id = Some(None);
        }
        Ok(patch)
    }
}

/// Fields for inserting a new request. New requests are always `open`.
#[derive(Debug, Clone)]
pub struct NewRequest {
    pub client_id: i64,
    pub topic: String,
    pub preferred_time: Option<String>,
    pub details: Option<String>,
}

/// Partial update for a request.
///
/// Outer `None` leaves a field untouched; `Some(None)` clears a nullable one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestPatch {
    pub status: Option<RequestStatus>,
    pub consultant_id: Option<Option<i64>>,
    pub preferred_time: Option<Option<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(status: RequestStatus, consultant_id: Option<i64>) -> ConsultationRequest {
        ConsultationRequest {
            id: 7,
            client_id: 1,
            topic: "Tax planning".into(),
            preferred_time: Some("2026-03-15 14:00".into()),
            details: None,
            status,
            consultant_id,
            created_at: Utc::now(),
        }
    }

    fn all_transitions() -> Vec<RequestTransition> {
        vec![
            RequestTransition::Take { consultant_id: 2 },
            RequestTransition::ProposeTime { time: "t".into() },
            RequestTransition::AcceptProposedTime,
            RequestTransition::CounterOffer { time: "t".into() },
            RequestTransition::AcceptClientTime,
            RequestTransition::ClientCancel,
            RequestTransition::AdminCancel,
            RequestTransition::ReturnToPool,
        ]
    }

    #[test]
    fn valid_transitions() {
        use RequestStatus::*;
        let table = [
            (Open, RequestTransition::Take { consultant_id: 2 }, Taken),
            (Taken, RequestTransition::ProposeTime { time: "t".into() }, TimeProposed),
            (TimeProposed, RequestTransition::AcceptProposedTime, Scheduled),
            (TimeProposed, RequestTransition::CounterOffer { time: "t".into() }, Taken),
            (Taken, RequestTransition::AcceptClientTime, Scheduled),
            (Open, RequestTransition::ClientCancel, Cancelled),
            (Taken, RequestTransition::ClientCancel, Cancelled),
            (TimeProposed, RequestTransition::ClientCancel, Cancelled),
            (Scheduled, RequestTransition::AdminCancel, Cancelled),
            (Taken, RequestTransition::ReturnToPool, Open),
            (TimeProposed, RequestTransition::ReturnToPool, Open),
        ];
        for (from, t, to) in table {
            assert_eq!(from.apply(&t), Ok(to), "{from} --{}--> {to}", t.name());
        }
    }

    #[test]
    fn invalid_transitions() {
        use RequestStatus::*;
        assert!(Taken.apply(&RequestTransition::Take { consultant_id: 3 }).is_err());
        assert!(Open.apply(&RequestTransition::ProposeTime { time: "t".into() }).is_err());
        assert!(Taken.apply(&RequestTransition::AcceptProposedTime).is_err());
        assert!(TimeProposed.apply(&RequestTransition::AcceptClientTime).is_err());
        assert!(Scheduled.apply(&RequestTransition::ClientCancel).is_err());
        assert!(Open.apply(&RequestTransition::ReturnToPool).is_err());
        assert!(Scheduled.apply(&RequestTransition::ReturnToPool).is_err());
    }

    #[test]
    fn cancelled_is_terminal() {
        for t in all_transitions() {
            assert!(RequestStatus::Cancelled.apply(&t).is_err(), "{}", t.name());
        }
    }

    #[test]
    fn illegal_transition_message_names_both_sides() {
        let err = RequestStatus::Scheduled
            .apply(&RequestTransition::ReturnToPool)
            .unwrap_err();
        assert_eq!(err.to_string(), "cannot return_to_pool a request that is scheduled");
    }

    #[test]
    fn plan_keeps_consultant_invariant_for_every_legal_move() {
        for status in RequestStatus::ALL {
            let consultant = status.has_consultant().then_some(2);
            let req = request(status, consultant);
            for t in all_transitions() {
                let Ok(patch) = req.plan(&t) else { continue };
                let target = patch.status.unwrap();
                let resulting = match patch.consultant_id {
                    Some(c) => c,
                    None => req.consultant_id,
                };
                assert_eq!(
                    resulting.is_some(),
                    target.has_consultant(),
                    "{status} --{}--> {target}",
                    t.name()
                );
            }
        }
    }

    #[test]
    fn plan_take_assigns_consultant() {
        let patch = request(RequestStatus::Open, None)
            .plan(&RequestTransition::Take { consultant_id: 9 })
            .unwrap();
        assert_eq!(patch.status, Some(RequestStatus::Taken));
        assert_eq!(patch.consultant_id, Some(Some(9)));
    }

    #[test]
    fn plan_counter_offer_overwrites_preferred_time() {
        let patch = request(RequestStatus::TimeProposed, Some(2))
            .plan(&RequestTransition::CounterOffer {
                time: "2026-03-17 09:00".into(),
            })
            .unwrap();
        assert_eq!(patch.status, Some(RequestStatus::Taken));
        assert_eq!(patch.preferred_time, Some(Some("2026-03-17 09:00".into())));
        assert_eq!(patch.consultant_id, None);
    }

    #[test]
    fn plan_return_clears_consultant() {
        let patch = request(RequestStatus::Taken, Some(2))
            .plan(&RequestTransition::ReturnToPool)
            .unwrap();
        assert_eq!(patch.status, Some(RequestStatus::Open));
        assert_eq!(patch.consultant_id, Some(None));
    }

    #[test]
    fn display_matches_serde() {
        for status in RequestStatus::ALL {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(format!("\"{status}\""), json);
            assert_eq!(status.as_str().parse::<RequestStatus>().unwrap(), status);
        }
    }
}
