//! Moderation state machine.
//!
//! ```text
//!            approve              offline
//!   pending ─────────▶ approved ◀────────▶ offline
//!      │                          online
//!      │ reject
//!      ▼
//!   rejected   (left only through a content edit, which resets to pending)
//! ```
//!
//! Every transition appends an [`AuditRecord`](crate::state::AuditRecord)
//! in the same transaction as the status change. Status is never written
//! without its audit record.

use crate::error::{ListingError, Result};
use crate::providers::{ListingTransaction, NewAuditRecord};
use crate::state::{AuditAction, AuditRecordId, ListingId, ListingStatus, Principal, UserId};
use serde::{Deserialize, Serialize};

/// A moderator's request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ModerationCommand {
    /// Decide on a pending listing: `approved` or `rejected`.
    Audit {
        /// Target status
        target: ListingStatus,
        /// Required when rejecting
        reason: Option<String>,
    },
    /// Move a moderated listing between `approved` and `offline`.
    Toggle {
        /// Target status
        target: ListingStatus,
    },
}

impl ModerationCommand {
    /// Target status of the command.
    #[must_use]
    pub const fn target(&self) -> ListingStatus {
        match self {
            Self::Audit { target, .. } | Self::Toggle { target } => *target,
        }
    }

    /// Check the command's own arguments, independent of listing state.
    ///
    /// # Errors
    ///
    /// Returns [`ListingError::Validation`] for an unsupported target or a
    /// rejection without a reason.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Audit { target, reason } => match target {
                ListingStatus::Approved => Ok(()),
                ListingStatus::Rejected => {
                    if reason.as_deref().is_none_or(|r| r.trim().is_empty()) {
                        Err(ListingError::validation(
                            "reason",
                            "a reason is required when rejecting a listing",
                        ))
                    } else {
                        Ok(())
                    }
                }
                other => Err(ListingError::validation(
                    "target_status",
                    format!("audit cannot move a listing to {other}"),
                )),
            },
            Self::Toggle { target } => match target {
                ListingStatus::Approved | ListingStatus::Offline => Ok(()),
                other => Err(ListingError::validation(
                    "target_status",
                    format!("toggle cannot move a listing to {other}"),
                )),
            },
        }
    }
}

/// A legal, fully determined status change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    /// Status before.
    pub from: ListingStatus,
    /// Status after.
    pub to: ListingStatus,
    /// Audit action to record.
    pub action: AuditAction,
    /// Value of `rejection_reason` after the change.
    pub rejection_reason: Option<String>,
    /// Reason stored on the audit record.
    pub audit_reason: Option<String>,
}

/// `true` if the state machine has an edge `from -> to`.
#[must_use]
pub const fn is_legal(from: ListingStatus, to: ListingStatus) -> bool {
    matches!(
        (from, to),
        (ListingStatus::Pending, ListingStatus::Approved | ListingStatus::Rejected)
            | (ListingStatus::Approved, ListingStatus::Offline)
            | (ListingStatus::Offline, ListingStatus::Approved)
    )
}

/// Resolve `command` against the listing's `current` status.
///
/// # Errors
///
/// - [`ListingError::Validation`] if the command itself is malformed
/// - [`ListingError::StateConflict`] if `current` is not a legal source
pub fn plan_transition(current: ListingStatus, command: &ModerationCommand) -> Result<Transition> {
    command.validate()?;

    match command {
        ModerationCommand::Audit { target, reason } => {
            if current != ListingStatus::Pending {
                return Err(ListingError::StateConflict {
                    current,
                    required: "pending".to_string(),
                });
            }

            let reason = reason
                .as_deref()
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(str::to_string);

            let (action, rejection_reason) = if *target == ListingStatus::Rejected {
                (AuditAction::Reject, reason.clone())
            } else {
                (AuditAction::Approve, None)
            };

            Ok(Transition {
                from: current,
                to: *target,
                action,
                rejection_reason,
                audit_reason: reason,
            })
        }
        ModerationCommand::Toggle { target } => {
            if !is_legal(current, *target)
                || !matches!(current, ListingStatus::Approved | ListingStatus::Offline)
            {
                return Err(ListingError::StateConflict {
                    current,
                    required: match target {
                        ListingStatus::Offline => "approved".to_string(),
                        _ => "offline".to_string(),
                    },
                });
            }

            let action = if *target == ListingStatus::Offline {
                AuditAction::Offline
            } else {
                AuditAction::Online
            };

            Ok(Transition {
                from: current,
                to: *target,
                action,
                rejection_reason: None,
                audit_reason: None,
            })
        }
    }
}

/// Result of a committed moderation command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModerationOutcome {
    /// Listing moderated.
    pub listing_id: ListingId,
    /// Owner of the listing.
    pub owner_id: UserId,
    /// Status before.
    pub from: ListingStatus,
    /// Status after.
    pub to: ListingStatus,
    /// Appended audit record.
    pub audit_record_id: AuditRecordId,
}

/// Lock the listing, apply `command` and append the audit record within `tx`.
///
/// The row lock serializes concurrent moderators: the second one sees the
/// first one's status and fails the legality check.
///
/// # Errors
///
/// - [`ListingError::NotFound`] if the listing does not exist
/// - Errors from [`plan_transition`]
/// - Infrastructure errors from the transaction
pub async fn apply<T: ListingTransaction>(
    tx: &mut T,
    actor: &Principal,
    listing_id: ListingId,
    command: &ModerationCommand,
) -> Result<ModerationOutcome> {
    let listing = tx
        .lock_listing(listing_id)
        .await?
        .ok_or(ListingError::NotFound)?;

    let transition = plan_transition(listing.status, command)?;

    tx.set_status(listing_id, transition.to, transition.rejection_reason.clone())
        .await?;

    let audit_record_id = tx
        .append_audit_record(NewAuditRecord {
            listing_id,
            actor_id: actor.id,
            action: transition.action,
            reason: transition.audit_reason,
        })
        .await?;

    Ok(ModerationOutcome {
        listing_id,
        owner_id: listing.owner_id,
        from: transition.from,
        to: transition.to,
        audit_record_id,
    })
}
