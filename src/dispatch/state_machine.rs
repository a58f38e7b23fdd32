//! Delivery status state machine.
//!
//! ```text
//! REQUESTED -> ASSIGNED -> ACCEPTED -> PICKED_UP -> DELIVERED
//!     |            |           |
//!     +------------+-----------+--> CANCELLED
//! ```
//!
//! Each edge also names who may take it. Anything else, including an
//! allowed edge taken by the wrong actor, is an invalid transition. The
//! functions here are pure; they return the next version of the record
//! and leave the input untouched.

use chrono::{DateTime, Utc};

use crate::model::{Actor, Delivery, DeliveryStatus, Role};
use crate::utils::{DispatchError, Result};

/// Whether `from -> to` is an edge of the state machine, ignoring actors.
pub fn is_edge(from: DeliveryStatus, to: DeliveryStatus) -> bool {
    use DeliveryStatus::*;
    matches!(
        (from, to),
        (Requested, Assigned)
            | (Assigned, Accepted)
            | (Accepted, PickedUp)
            | (PickedUp, Delivered)
            | (Requested, Cancelled)
            | (Assigned, Cancelled)
            | (Accepted, Cancelled)
    )
}

fn is_assigned_driver(delivery: &Delivery, actor: &Actor) -> bool {
    actor.role == Role::Driver && delivery.driver_id.as_deref() == Some(actor.id.as_str())
}

fn is_owner(delivery: &Delivery, actor: &Actor) -> bool {
    actor.role == Role::Client && delivery.client_id == actor.id
}

fn actor_may(delivery: &Delivery, to: DeliveryStatus, actor: &Actor) -> bool {
    use DeliveryStatus::*;
    match (delivery.status, to) {
        (Requested, Assigned) => matches!(actor.role, Role::Admin | Role::Dispatcher),
        (Assigned, Accepted) | (Accepted, PickedUp) | (PickedUp, Delivered) => {
            is_assigned_driver(delivery, actor)
        }
        (Assigned, Cancelled) => {
            is_assigned_driver(delivery, actor) || is_owner(delivery, actor) || actor.role == Role::Admin
        }
        (Requested, Cancelled) | (Accepted, Cancelled) => {
            is_owner(delivery, actor) || actor.role == Role::Admin
        }
        _ => false,
    }
}

fn check(delivery: &Delivery, to: DeliveryStatus, actor: &Actor) -> Result<()> {
    if is_edge(delivery.status, to) && actor_may(delivery, to, actor) {
        Ok(())
    } else {
        Err(DispatchError::InvalidTransition {
            from: delivery.status.to_string(),
            to: to.to_string(),
        })
    }
}

/// Move `delivery` to `to` on behalf of `actor`.
///
/// Use [`assign`] for `REQUESTED -> ASSIGNED`, which needs a driver.
pub fn transition(
    delivery: &Delivery,
    to: DeliveryStatus,
    actor: &Actor,
) -> Result<Delivery> {
    if to == DeliveryStatus::Assigned {
        return Err(DispatchError::invalid_input("assignment requires a driver id"));
    }
    check(delivery, to, actor)?;

    let mut next = delivery.clone();
    next.status = to;
    if !to.has_driver() {
        next.driver_id = None;
    }
    Ok(next)
}

/// `REQUESTED -> ASSIGNED`, attaching `driver_id` in the same step.
pub fn assign(
    delivery: &Delivery,
    driver_id: &str,
    actor: &Actor,
    now: DateTime<Utc>,
) -> Result<Delivery> {
    if driver_id.trim().is_empty() {
        return Err(DispatchError::invalid_input("driver id must not be empty"));
    }
    check(delivery, DeliveryStatus::Assigned, actor)?;

    let mut next = delivery.clone();
    next.status = DeliveryStatus::Assigned;
    next.driver_id = Some(driver_id.to_string());
    next.assigned_at = Some(now);
    Ok(next)
}
