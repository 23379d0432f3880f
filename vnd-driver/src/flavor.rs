//! Data describing the VLAN-style driver types.
//!
//! macvlan and ipvlan keep identical state and differ only in the names of a
//! few fields, the accepted modes and the MAC address policy, so a single
//! driver implementation serves both.

/// Secondary flag carried by some flavors (ipvlan's `IpvlanFlag`).
#[derive(Debug, PartialEq, Eq)]
pub struct FlagSpec {
    /// Generic option the flag is read from at network creation.
    pub option: &'static str,
    /// Field name in the persisted network record.
    pub field: &'static str,
    /// Accepted values. The first one is the baseline applied to records
    /// written before the flag existed.
    pub values: &'static [&'static str],
}

impl FlagSpec {
    pub fn baseline(&self) -> &'static str {
        self.values[0]
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct Flavor {
    /// Driver type name, also the first key component of every record.
    pub name: &'static str,
    /// Generic option the mode is read from.
    pub mode_option: &'static str,
    /// Field name of the mode in the persisted network record.
    pub mode_field: &'static str,
    /// Accepted modes, default first.
    pub modes: &'static [&'static str],
    pub flag: Option<FlagSpec>,
    /// Whether endpoints may carry their own MAC address.
    pub custom_mac: bool,
    /// Prefix for generated interface names.
    pub link_prefix: &'static str,
}

pub static MACVLAN: Flavor = Flavor {
    name: "macvlan",
    mode_option: "macvlan_mode",
    mode_field: "MacvlanMode",
    modes: &["bridge", "private", "vepa", "passthru"],
    flag: None,
    custom_mac: true,
    link_prefix: "macv",
};

pub static IPVLAN: Flavor = Flavor {
    name: "ipvlan",
    mode_option: "ipvlan_mode",
    mode_field: "IpvlanMode",
    modes: &["l2", "l3", "l3s"],
    flag: Some(FlagSpec {
        option: "ipvlan_flag",
        field: "IpvlanFlag",
        values: &["bridge", "private", "vepa"],
    }),
    custom_mac: false,
    link_prefix: "ipv",
};

impl Flavor {
    pub fn from_name(name: &str) -> Option<&'static Flavor> {
        [&MACVLAN, &IPVLAN]
            .into_iter()
            .find(|flavor| flavor.name == name)
    }

    pub fn default_mode(&self) -> &'static str {
        self.modes[0]
    }

    pub fn network_prefix(&self) -> String {
        format!("{}/network", self.name)
    }

    pub fn endpoint_prefix(&self) -> String {
        format!("{}/endpoint", self.name)
    }

    pub fn supports_mode(&self, mode: &str) -> bool {
        self.modes.iter().any(|m| *m == mode)
    }

    pub fn supports_flag(&self, flag: &str) -> bool {
        self.flag
            .as_ref()
            .is_some_and(|spec| spec.values.iter().any(|v| *v == flag))
    }
}
