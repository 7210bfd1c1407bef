/*!
 * Transition events emitted by the engine.
 *
 * Events fire only when a control's observed value actually changes; a
 * redundant poll or repeated report never re-fires one. Every change
 * additionally emits the generic `StateChanged` alongside the specific
 * on/off or dim event, so automation layers can subscribe at either
 * granularity.
 */
use chrono::{DateTime, Utc};

use muxnode_core::types::{EndpointId, Value};

/// A state transition observed on an endpoint
#[derive(Debug, Clone)]
pub enum EndpointEvent {
    /// The endpoint turned on
    TurnedOn {
        /// The endpoint that changed
        endpoint: EndpointId,
        /// The endpoint's resolved display name
        label: String,
        /// When the change was observed
        timestamp: DateTime<Utc>,
    },
    /// The endpoint turned off
    TurnedOff {
        /// The endpoint that changed
        endpoint: EndpointId,
        /// The endpoint's resolved display name
        label: String,
        /// When the change was observed
        timestamp: DateTime<Utc>,
    },
    /// The endpoint's dim level changed
    DimChanged {
        /// The endpoint that changed
        endpoint: EndpointId,
        /// The endpoint's resolved display name
        label: String,
        /// The new dim level in [0, 1]
        level: f64,
        /// When the change was observed
        timestamp: DateTime<Utc>,
    },
    /// A control of the endpoint changed (generic companion event)
    StateChanged {
        /// The endpoint that changed
        endpoint: EndpointId,
        /// The endpoint's resolved display name
        label: String,
        /// The new control value
        value: Value,
        /// When the change was observed
        timestamp: DateTime<Utc>,
    },
}

impl EndpointEvent {
    /// Create a turned-on event stamped now
    pub fn turned_on(endpoint: EndpointId, label: String) -> Self {
        EndpointEvent::TurnedOn {
            endpoint,
            label,
            timestamp: Utc::now(),
        }
    }

    /// Create a turned-off event stamped now
    pub fn turned_off(endpoint: EndpointId, label: String) -> Self {
        EndpointEvent::TurnedOff {
            endpoint,
            label,
            timestamp: Utc::now(),
        }
    }

    /// Create a dim-changed event stamped now
    pub fn dim_changed(endpoint: EndpointId, label: String, level: f64) -> Self {
        EndpointEvent::DimChanged {
            endpoint,
            label,
            level,
            timestamp: Utc::now(),
        }
    }

    /// Create a state-changed event stamped now
    pub fn state_changed(endpoint: EndpointId, label: String, value: Value) -> Self {
        EndpointEvent::StateChanged {
            endpoint,
            label,
            value,
            timestamp: Utc::now(),
        }
    }

    /// Get the endpoint the event concerns
    pub fn endpoint(&self) -> EndpointId {
        match self {
            EndpointEvent::TurnedOn { endpoint, .. }
            | EndpointEvent::TurnedOff { endpoint, .. }
            | EndpointEvent::DimChanged { endpoint, .. }
            | EndpointEvent::StateChanged { endpoint, .. } => *endpoint,
        }
    }

    /// Get the endpoint's resolved display name
    pub fn label(&self) -> &str {
        match self {
            EndpointEvent::TurnedOn { label, .. }
            | EndpointEvent::TurnedOff { label, .. }
            | EndpointEvent::DimChanged { label, .. }
            | EndpointEvent::StateChanged { label, .. } => label,
        }
    }

    /// Get when the change was observed
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            EndpointEvent::TurnedOn { timestamp, .. }
            | EndpointEvent::TurnedOff { timestamp, .. }
            | EndpointEvent::DimChanged { timestamp, .. }
            | EndpointEvent::StateChanged { timestamp, .. } => *timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_accessors() {
        let event = EndpointEvent::turned_on(EndpointId::new(3), "Dimmer 3".to_string());
        assert_eq!(event.endpoint(), EndpointId::new(3));
        assert_eq!(event.label(), "Dimmer 3");

        let event = EndpointEvent::dim_changed(EndpointId::new(3), "Dimmer 3".to_string(), 0.5);
        match event {
            EndpointEvent::DimChanged { level, .. } => assert!((level - 0.5).abs() < f64::EPSILON),
            _ => panic!("expected a dim-changed event"),
        }

        let event = EndpointEvent::state_changed(
            EndpointId::new(2),
            "Switch 2".to_string(),
            Value::Bool(false),
        );
        assert_eq!(event.endpoint(), EndpointId::new(2));
    }
}
