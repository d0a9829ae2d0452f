//! Cluster component role and identity types.

use std::fmt;

/// Role tag of a cluster component, as carried on the wire.
///
/// Values outside the named roles are kept as-is so that a peer running a
/// newer role table can still be decoded.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ComponentType(pub i32);

impl ComponentType {
    /// Placeholder role, never a real answer.
    pub const UNKNOWN: ComponentType = ComponentType(0);
    pub const DATABASE_MANAGER: ComponentType = ComponentType(1);
    pub const LOGIN_APP: ComponentType = ComponentType(2);
    pub const BASE_APP_MANAGER: ComponentType = ComponentType(3);
    pub const CELL_APP_MANAGER: ComponentType = ComponentType(4);
    pub const CELL_APP: ComponentType = ComponentType(5);
    pub const BASE_APP: ComponentType = ComponentType(6);
    pub const CLIENT: ComponentType = ComponentType(7);
    pub const MACHINE: ComponentType = ComponentType(8);
    pub const CONSOLE: ComponentType = ComponentType(9);
    pub const LOGGER: ComponentType = ComponentType(10);
    pub const BOTS: ComponentType = ComponentType(11);
    pub const WATCHER: ComponentType = ComponentType(12);
    pub const INTERFACES: ComponentType = ComponentType(13);

    pub fn is_unknown(self) -> bool {
        self == ComponentType::UNKNOWN
    }

    /// Human readable role name, used in logs.
    pub fn name(self) -> &'static str {
        match self.0 {
            0 => "unknown",
            1 => "dbmgr",
            2 => "loginapp",
            3 => "baseappmgr",
            4 => "cellappmgr",
            5 => "cellapp",
            6 => "baseapp",
            7 => "client",
            8 => "machine",
            9 => "console",
            10 => "logger",
            11 => "bots",
            12 => "watcher",
            13 => "interfaces",
            _ => "unrecognized",
        }
    }
}

impl Default for ComponentType {
    fn default() -> Self {
        ComponentType::UNKNOWN
    }
}

impl From<i32> for ComponentType {
    fn from(raw: i32) -> Self {
        ComponentType(raw)
    }
}

impl fmt::Display for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}[{}]", self.0, self.name())
    }
}

/// Numeric identity of the process currently serving a role.
///
/// Zero is the unset sentinel and never a resolved identity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ComponentId(pub u64);

impl ComponentId {
    pub const UNSET: ComponentId = ComponentId(0);

    pub fn is_set(self) -> bool {
        self.0 != 0
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl From<u64> for ComponentId {
    fn from(raw: u64) -> Self {
        ComponentId(raw)
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[test]
fn component_type_display_test() {
    assert_eq!(format!("{}", ComponentType::CELL_APP), "5[cellapp]");
    assert_eq!(format!("{}", ComponentType::LOGIN_APP), "2[loginapp]");
    assert_eq!(format!("{}", ComponentType(99)), "99[unrecognized]");
    assert!(ComponentType::default().is_unknown());
}

#[test]
fn component_id_sentinel_test() {
    assert!(!ComponentId::UNSET.is_set());
    assert!(ComponentId::from(123_456_789).is_set());
}
