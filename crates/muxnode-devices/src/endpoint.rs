/*!
 * Endpoint model and classification for MuxNode.
 *
 * A multi-channel node multiplexes several logically independent sub-devices
 * ("endpoints") behind one physical identity. This module defines the typed
 * descriptor the protocol adapter reports for each endpoint, and the
 * classification function that maps a descriptor to a supported endpoint kind.
 */
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use muxnode_core::types::EndpointId;

/// Generic device class advertised by an endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GenericClass {
    /// A binary (on/off) switch
    BinarySwitch,
    /// A multilevel (dimmable) switch
    MultilevelSwitch,
    /// A sensor of some kind
    Sensor,
    /// Any other device class
    Other,
}

/// A named group of protocol operations an endpoint may support
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CommandClass {
    /// Binary switch get/set/report
    SwitchBinary,
    /// Multilevel switch get/set/report
    SwitchMultilevel,
    /// Basic get/set/report
    Basic,
    /// Metering reports
    Meter,
}

impl fmt::Display for CommandClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CommandClass::SwitchBinary => "switch-binary",
            CommandClass::SwitchMultilevel => "switch-multilevel",
            CommandClass::Basic => "basic",
            CommandClass::Meter => "meter",
        };
        write!(f, "{}", name)
    }
}

/// Descriptor for a single endpoint, as reported by the protocol adapter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointDescriptor {
    /// The endpoint's generic device class
    pub generic_class: GenericClass,
    /// The command classes the endpoint exposes
    pub command_classes: BTreeSet<CommandClass>,
}

impl EndpointDescriptor {
    /// Create a new endpoint descriptor
    pub fn new<I>(generic_class: GenericClass, command_classes: I) -> Self
    where
        I: IntoIterator<Item = CommandClass>,
    {
        Self {
            generic_class,
            command_classes: command_classes.into_iter().collect(),
        }
    }

    /// Check whether the endpoint exposes a command class
    pub fn supports(&self, command_class: CommandClass) -> bool {
        self.command_classes.contains(&command_class)
    }
}

/// A topology snapshot: every endpoint the node currently exposes.
///
/// Keyed by endpoint id; the BTreeMap guarantees ascending iteration order,
/// which the discovery and synchronization passes rely on.
pub type Topology = BTreeMap<EndpointId, EndpointDescriptor>;

/// The kind of a classified endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointKind {
    /// A dimmable endpoint with an on/off and a level control
    Dimmer,
    /// An on/off-only endpoint
    Switch,
}

impl EndpointKind {
    /// Get the command class this kind of endpoint reports and is polled on
    pub fn command_class(&self) -> CommandClass {
        match self {
            EndpointKind::Dimmer => CommandClass::SwitchMultilevel,
            EndpointKind::Switch => CommandClass::SwitchBinary,
        }
    }

    /// Map a report's command class back to the endpoint kind it concerns.
    ///
    /// Used to scope root (endpoint-less) reports to the class of endpoints
    /// that must be resynchronized.
    pub fn for_command_class(command_class: CommandClass) -> Option<Self> {
        match command_class {
            CommandClass::SwitchMultilevel => Some(EndpointKind::Dimmer),
            CommandClass::SwitchBinary => Some(EndpointKind::Switch),
            _ => None,
        }
    }
}

impl fmt::Display for EndpointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndpointKind::Dimmer => write!(f, "dimmer"),
            EndpointKind::Switch => write!(f, "switch"),
        }
    }
}

/// Classify an endpoint descriptor.
///
/// An endpoint is a `Dimmer` iff its generic class is the multilevel-switch
/// class and it exposes the multilevel command class; a `Switch` iff its
/// generic class is the binary-switch class and it exposes the binary command
/// class. Anything else is unsupported and yields `None`.
pub fn classify(descriptor: &EndpointDescriptor) -> Option<EndpointKind> {
    match descriptor.generic_class {
        GenericClass::MultilevelSwitch if descriptor.supports(CommandClass::SwitchMultilevel) => {
            Some(EndpointKind::Dimmer)
        }
        GenericClass::BinarySwitch if descriptor.supports(CommandClass::SwitchBinary) => {
            Some(EndpointKind::Switch)
        }
        _ => None,
    }
}
