//! Persisted network and endpoint records.
//!
//! Both records are written as flat JSON objects with the field names used by
//! existing on-disk state. Decoding is explicit: every required field is
//! checked for presence and type, so a damaged record produces a
//! [`DecodeError`] instead of a half-filled struct.

use std::net::IpAddr;

use ipnet::{IpNet, Ipv4Net, Ipv6Net};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use vnd_store::{DecodeError, KvObject, assign};

use crate::flavor::Flavor;
use crate::mac::MacAddress;

type Object = Map<String, Value>;

/// One subnet of a network, with its optional gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpSubnet {
    pub subnet: IpNet,
    pub gateway: Option<IpNet>,
}

impl IpSubnet {
    pub fn contains(&self, addr: IpAddr) -> bool {
        self.subnet.contains(&addr)
    }
}

/// Wire shape of an [`IpSubnet`].
#[derive(Debug, Serialize, Deserialize)]
struct SubnetWire {
    #[serde(rename = "SubnetIP")]
    subnet_ip: String,
    #[serde(rename = "GwIP", default)]
    gw_ip: String,
}

/// State of one network owned by a VLAN-style driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkConfig {
    pub flavor: &'static Flavor,
    pub id: String,
    pub mtu: u32,
    pub internal: bool,
    pub parent: String,
    pub mode: String,
    /// Secondary flag, only for flavors that define one.
    pub flag: Option<String>,
    /// The driver created the parent link itself (dummy or VLAN sub-interface).
    pub created_sub_iface: bool,
    pub ipv4_subnets: Vec<IpSubnet>,
    pub ipv6_subnets: Vec<IpSubnet>,
    db_index: u64,
    db_exists: bool,
}

impl NetworkConfig {
    /// Zero value for `flavor`.
    pub fn empty(flavor: &'static Flavor) -> Self {
        Self {
            flavor,
            id: String::new(),
            mtu: 0,
            internal: false,
            parent: String::new(),
            mode: String::new(),
            flag: None,
            created_sub_iface: false,
            ipv4_subnets: Vec::new(),
            ipv6_subnets: Vec::new(),
            db_index: 0,
            db_exists: false,
        }
    }

    pub fn new(flavor: &'static Flavor, id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::empty(flavor)
        }
    }

    pub fn subnets(&self) -> impl Iterator<Item = &IpSubnet> {
        self.ipv4_subnets.iter().chain(self.ipv6_subnets.iter())
    }

    fn encode(&self) -> serde_json::Result<Object> {
        let mut m = Object::new();
        m.insert("ID".into(), Value::from(self.id.clone()));
        m.insert("Mtu".into(), Value::from(self.mtu));
        m.insert("Parent".into(), Value::from(self.parent.clone()));
        m.insert(self.flavor.mode_field.into(), Value::from(self.mode.clone()));
        if let Some(spec) = &self.flavor.flag {
            let flag = self.flag.as_deref().unwrap_or(spec.baseline());
            m.insert(spec.field.into(), Value::from(flag));
        }
        m.insert("Internal".into(), Value::from(self.internal));
        m.insert("CreatedSubIface".into(), Value::from(self.created_sub_iface));
        if !self.ipv4_subnets.is_empty() {
            m.insert("Ipv4Subnets".into(), encode_subnets(&self.ipv4_subnets)?);
        }
        if !self.ipv6_subnets.is_empty() {
            m.insert("Ipv6Subnets".into(), encode_subnets(&self.ipv6_subnets)?);
        }
        Ok(m)
    }

    fn decode(&mut self, value: &[u8]) -> Result<(), DecodeError> {
        let m = parse_object(value)?;
        let flavor = self.flavor;

        let flag = match &flavor.flag {
            // Records written before the flag existed get the baseline. A
            // present value is kept as stored, empty included.
            Some(spec) => Some(match m.get(spec.field) {
                None | Some(Value::Null) => spec.baseline().to_string(),
                Some(Value::String(s)) => s.clone(),
                Some(_) => return Err(wrong_type(spec.field, "string")),
            }),
            None => None,
        };

        *self = NetworkConfig {
            flavor,
            id: str_field(&m, "ID")?,
            mtu: u32_field(&m, "Mtu")?,
            internal: bool_field(&m, "Internal")?,
            parent: str_field(&m, "Parent")?,
            mode: str_field(&m, flavor.mode_field)?,
            flag,
            created_sub_iface: bool_field(&m, "CreatedSubIface")?,
            ipv4_subnets: decode_subnets(&m, "Ipv4Subnets")?,
            ipv6_subnets: decode_subnets(&m, "Ipv6Subnets")?,
            db_index: self.db_index,
            db_exists: self.db_exists,
        };
        Ok(())
    }
}

impl KvObject for NetworkConfig {
    fn kind(&self) -> &'static str {
        "network"
    }

    fn key(&self) -> Vec<String> {
        vec![self.flavor.network_prefix(), self.id.clone()]
    }

    fn key_prefix(&self) -> Vec<String> {
        vec![self.flavor.network_prefix()]
    }

    fn value(&self) -> vnd_store::Result<Vec<u8>> {
        Ok(serde_json::to_vec(&self.encode()?)?)
    }

    fn set_value(&mut self, value: &[u8]) -> Result<(), DecodeError> {
        self.decode(value)
    }

    fn index(&self) -> u64 {
        self.db_index
    }

    fn set_index(&mut self, index: u64) {
        self.db_index = index;
        self.db_exists = true;
    }

    fn exists(&self) -> bool {
        self.db_exists
    }

    fn new_object(&self) -> Box<dyn KvObject> {
        Box::new(NetworkConfig::empty(self.flavor))
    }

    fn copy_to(&self, other: &mut dyn KvObject) -> vnd_store::Result<()> {
        assign(self, other)
    }
}

/// State of one endpoint attached to a network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub flavor: &'static Flavor,
    pub id: String,
    /// Owning network.
    pub nid: String,
    pub src_name: String,
    pub mac: Option<MacAddress>,
    pub addr: Option<Ipv4Net>,
    pub addrv6: Option<Ipv6Net>,
    db_index: u64,
    db_exists: bool,
}

impl Endpoint {
    pub fn empty(flavor: &'static Flavor) -> Self {
        Self {
            flavor,
            id: String::new(),
            nid: String::new(),
            src_name: String::new(),
            mac: None,
            addr: None,
            addrv6: None,
            db_index: 0,
            db_exists: false,
        }
    }

    pub fn new(flavor: &'static Flavor, id: impl Into<String>, nid: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            nid: nid.into(),
            ..Self::empty(flavor)
        }
    }

    fn encode(&self) -> Object {
        let mut m = Object::new();
        m.insert("id".into(), Value::from(self.id.clone()));
        m.insert("nid".into(), Value::from(self.nid.clone()));
        m.insert("SrcName".into(), Value::from(self.src_name.clone()));
        if let Some(mac) = &self.mac {
            m.insert("MacAddress".into(), Value::from(mac.to_string()));
        }
        if let Some(addr) = &self.addr {
            m.insert("Addr".into(), Value::from(addr.to_string()));
        }
        if let Some(addr) = &self.addrv6 {
            m.insert("Addrv6".into(), Value::from(addr.to_string()));
        }
        m
    }

    fn decode(&mut self, value: &[u8]) -> Result<(), DecodeError> {
        let m = parse_object(value)?;

        *self = Endpoint {
            flavor: self.flavor,
            id: str_field(&m, "id")?,
            nid: str_field(&m, "nid")?,
            src_name: str_field(&m, "SrcName")?,
            mac: parse_opt(&m, "MacAddress")?,
            addr: parse_opt(&m, "Addr")?,
            addrv6: parse_opt(&m, "Addrv6")?,
            db_index: self.db_index,
            db_exists: self.db_exists,
        };
        Ok(())
    }
}

impl KvObject for Endpoint {
    fn kind(&self) -> &'static str {
        "endpoint"
    }

    fn key(&self) -> Vec<String> {
        vec![self.flavor.endpoint_prefix(), self.id.clone()]
    }

    fn key_prefix(&self) -> Vec<String> {
        vec![self.flavor.endpoint_prefix()]
    }

    fn value(&self) -> vnd_store::Result<Vec<u8>> {
        Ok(serde_json::to_vec(&self.encode())?)
    }

    fn set_value(&mut self, value: &[u8]) -> Result<(), DecodeError> {
        self.decode(value)
    }

    fn index(&self) -> u64 {
        self.db_index
    }

    fn set_index(&mut self, index: u64) {
        self.db_index = index;
        self.db_exists = true;
    }

    fn exists(&self) -> bool {
        self.db_exists
    }

    fn new_object(&self) -> Box<dyn KvObject> {
        Box::new(Endpoint::empty(self.flavor))
    }

    fn copy_to(&self, other: &mut dyn KvObject) -> vnd_store::Result<()> {
        assign(self, other)
    }
}

fn parse_object(value: &[u8]) -> Result<Object, DecodeError> {
    match serde_json::from_slice::<Value>(value)? {
        Value::Object(m) => Ok(m),
        _ => Err(DecodeError::WrongType {
            field: "<record>".to_string(),
            expected: "object",
        }),
    }
}

fn field<'a>(m: &'a Object, name: &str) -> Result<&'a Value, DecodeError> {
    m.get(name)
        .ok_or_else(|| DecodeError::MissingField(name.to_string()))
}

fn wrong_type(name: &str, expected: &'static str) -> DecodeError {
    DecodeError::WrongType {
        field: name.to_string(),
        expected,
    }
}

fn str_field(m: &Object, name: &str) -> Result<String, DecodeError> {
    field(m, name)?
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| wrong_type(name, "string"))
}

fn bool_field(m: &Object, name: &str) -> Result<bool, DecodeError> {
    field(m, name)?
        .as_bool()
        .ok_or_else(|| wrong_type(name, "bool"))
}

fn u32_field(m: &Object, name: &str) -> Result<u32, DecodeError> {
    let n = field(m, name)?
        .as_u64()
        .ok_or_else(|| wrong_type(name, "unsigned integer"))?;
    u32::try_from(n).map_err(|e| DecodeError::invalid_value(name, n.to_string(), e))
}

/// Absent, null and empty strings all read as `None`.
fn opt_str_field(m: &Object, name: &str) -> Result<Option<String>, DecodeError> {
    match m.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(wrong_type(name, "string")),
    }
}

fn parse_opt<T>(m: &Object, name: &str) -> Result<Option<T>, DecodeError>
where
    T: std::str::FromStr,
    T::Err: ToString,
{
    opt_str_field(m, name)?
        .map(|s| {
            s.parse::<T>()
                .map_err(|e| DecodeError::invalid_value(name, s.as_str(), e))
        })
        .transpose()
}

fn encode_subnets(subnets: &[IpSubnet]) -> serde_json::Result<Value> {
    let wire: Vec<SubnetWire> = subnets
        .iter()
        .map(|s| SubnetWire {
            subnet_ip: s.subnet.to_string(),
            gw_ip: s.gateway.map(|gw| gw.to_string()).unwrap_or_default(),
        })
        .collect();
    // The list is embedded as a JSON string, not as a nested array.
    Ok(Value::String(serde_json::to_string(&wire)?))
}

fn decode_subnets(m: &Object, name: &str) -> Result<Vec<IpSubnet>, DecodeError> {
    let Some(raw) = opt_str_field(m, name)? else {
        return Ok(Vec::new());
    };
    let wire: Vec<SubnetWire> = serde_json::from_str(&raw)
        .map_err(|e| DecodeError::invalid_value(name, raw.as_str(), e))?;

    wire.into_iter()
        .map(|w| {
            let subnet = w
                .subnet_ip
                .parse::<IpNet>()
                .map_err(|e| DecodeError::invalid_value(name, w.subnet_ip.as_str(), e))?;
            let gateway = if w.gw_ip.is_empty() {
                None
            } else {
                Some(
                    w.gw_ip
                        .parse::<IpNet>()
                        .map_err(|e| DecodeError::invalid_value(name, w.gw_ip.as_str(), e))?,
                )
            };
            Ok(IpSubnet { subnet, gateway })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flavor::{IPVLAN, MACVLAN};

    fn sample_network() -> NetworkConfig {
        NetworkConfig {
            id: "3f2a9c1e8b7d".to_string(),
            mtu: 1500,
            internal: false,
            parent: "eth0.10".to_string(),
            mode: "l3".to_string(),
            flag: Some("private".to_string()),
            created_sub_iface: true,
            ipv4_subnets: vec![IpSubnet {
                subnet: "10.0.0.0/24".parse().unwrap(),
                gateway: Some("10.0.0.1/24".parse().unwrap()),
            }],
            ipv6_subnets: vec![IpSubnet {
                subnet: "fd00::/64".parse().unwrap(),
                gateway: None,
            }],
            ..NetworkConfig::empty(&IPVLAN)
        }
    }

    #[test]
    fn test_network_round_trip() {
        let network = sample_network();
        let bytes = network.value().unwrap();

        let mut decoded = NetworkConfig::empty(&IPVLAN);
        decoded.set_value(&bytes).unwrap();
        assert_eq!(decoded, network);
    }

    #[test]
    fn test_network_wire_layout() {
        let bytes = sample_network().value().unwrap();
        let v: Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(v["ID"], "3f2a9c1e8b7d");
        assert_eq!(v["Mtu"], 1500);
        assert_eq!(v["IpvlanMode"], "l3");
        assert_eq!(v["IpvlanFlag"], "private");
        assert_eq!(v["CreatedSubIface"], true);
        // Subnet lists are strings holding JSON.
        let subnets = v["Ipv4Subnets"].as_str().unwrap();
        assert_eq!(subnets, r#"[{"SubnetIP":"10.0.0.0/24","GwIP":"10.0.0.1/24"}]"#);
    }

    #[test]
    fn test_empty_subnets_are_omitted() {
        let network = NetworkConfig {
            id: "n1".to_string(),
            mode: "bridge".to_string(),
            parent: "eth0".to_string(),
            ..NetworkConfig::empty(&MACVLAN)
        };
        let v: Value = serde_json::from_slice(&network.value().unwrap()).unwrap();
        assert!(v.get("Ipv4Subnets").is_none());
        assert!(v.get("Ipv6Subnets").is_none());
        assert!(v.get("IpvlanFlag").is_none());
        assert_eq!(v["MacvlanMode"], "bridge");
    }

    #[test]
    fn test_missing_flag_decodes_to_baseline() {
        let raw = br#"{"ID":"n1","Mtu":0,"Parent":"eth0","IpvlanMode":"l2",
            "Internal":false,"CreatedSubIface":false}"#;
        let mut network = NetworkConfig::empty(&IPVLAN);
        network.set_value(raw).unwrap();
        assert_eq!(network.flag.as_deref(), Some("bridge"));
        assert!(network.ipv4_subnets.is_empty());
    }

    #[test]
    fn test_empty_flag_is_kept() {
        let raw = br#"{"ID":"n1","Mtu":0,"Parent":"eth0","IpvlanMode":"l2","IpvlanFlag":"",
            "Internal":false,"CreatedSubIface":false}"#;
        let mut network = NetworkConfig::empty(&IPVLAN);
        network.set_value(raw).unwrap();
        assert_eq!(network.flag.as_deref(), Some(""));

        let raw = br#"{"ID":"n1","Mtu":0,"Parent":"eth0","IpvlanMode":"l2","IpvlanFlag":null,
            "Internal":false,"CreatedSubIface":false}"#;
        network.set_value(raw).unwrap();
        assert_eq!(network.flag.as_deref(), Some("bridge"));

        let raw = br#"{"ID":"n1","Mtu":0,"Parent":"eth0","IpvlanMode":"l2","IpvlanFlag":1,
            "Internal":false,"CreatedSubIface":false}"#;
        assert!(matches!(
            network.set_value(raw).unwrap_err(),
            DecodeError::WrongType { field, .. } if field == "IpvlanFlag"
        ));
    }

    #[test]
    fn test_unknown_fields_are_ignored() {
        let raw = br#"{"ID":"n1","Mtu":9000,"Parent":"eth0","MacvlanMode":"vepa",
            "Internal":true,"CreatedSubIface":false,"Future":42}"#;
        let mut network = NetworkConfig::empty(&MACVLAN);
        network.set_value(raw).unwrap();
        assert_eq!(network.mtu, 9000);
        assert!(network.internal);
        assert_eq!(network.flag, None);
    }

    #[test]
    fn test_missing_required_field() {
        let raw = br#"{"ID":"n1","Mtu":0,"MacvlanMode":"bridge","Internal":false,"CreatedSubIface":false}"#;
        let mut network = NetworkConfig::empty(&MACVLAN);
        let err = network.set_value(raw).unwrap_err();
        assert!(matches!(err, DecodeError::MissingField(f) if f == "Parent"));
    }

    #[test]
    fn test_wrong_field_type() {
        let raw = br#"{"ID":"n1","Mtu":"1500","Parent":"eth0","MacvlanMode":"bridge","Internal":false,"CreatedSubIface":false}"#;
        let mut network = NetworkConfig::empty(&MACVLAN);
        let err = network.set_value(raw).unwrap_err();
        assert!(matches!(err, DecodeError::WrongType { field, .. } if field == "Mtu"));
    }

    #[test]
    fn test_malformed_subnet() {
        let raw = br#"{"ID":"n1","Mtu":0,"Parent":"eth0","MacvlanMode":"bridge","Internal":false,
            "CreatedSubIface":false,"Ipv4Subnets":"[{\"SubnetIP\":\"10.0.0.300/24\"}]"}"#;
        let mut network = NetworkConfig::empty(&MACVLAN);
        assert!(matches!(
            network.set_value(raw).unwrap_err(),
            DecodeError::InvalidValue { .. }
        ));

        let raw = br#"{"ID":"n1","Mtu":0,"Parent":"eth0","MacvlanMode":"bridge","Internal":false,
            "CreatedSubIface":false,"Ipv4Subnets":"not json"}"#;
        assert!(network.set_value(raw).is_err());
    }

    #[test]
    fn test_not_an_object() {
        let mut network = NetworkConfig::empty(&MACVLAN);
        assert!(network.set_value(b"[1,2,3]").is_err());
        assert!(network.set_value(b"{truncated").is_err());
    }

    #[test]
    fn test_set_value_keeps_version_stamp() {
        let mut network = NetworkConfig::empty(&MACVLAN);
        network.set_index(9);
        let bytes = NetworkConfig {
            id: "n1".to_string(),
            ..NetworkConfig::empty(&MACVLAN)
        }
        .value()
        .unwrap();
        network.set_value(&bytes).unwrap();
        assert_eq!(network.index(), 9);
        assert!(network.exists());
    }

    #[test]
    fn test_endpoint_round_trip() {
        let endpoint = Endpoint {
            id: "ep1".to_string(),
            nid: "n1".to_string(),
            src_name: "macv3f2a9c1".to_string(),
            mac: Some("02:42:0a:00:00:02".parse().unwrap()),
            addr: Some("10.0.0.2/24".parse().unwrap()),
            addrv6: Some("fd00::2/64".parse().unwrap()),
            ..Endpoint::empty(&MACVLAN)
        };

        let mut decoded = Endpoint::empty(&MACVLAN);
        decoded.set_value(&endpoint.value().unwrap()).unwrap();
        assert_eq!(decoded, endpoint);
    }

    #[test]
    fn test_endpoint_optional_fields_omitted() {
        let endpoint = Endpoint {
            id: "ep1".to_string(),
            nid: "n1".to_string(),
            src_name: "ipv1".to_string(),
            addr: Some("10.0.0.2/24".parse().unwrap()),
            ..Endpoint::empty(&IPVLAN)
        };
        let v: Value = serde_json::from_slice(&endpoint.value().unwrap()).unwrap();
        assert!(v.get("MacAddress").is_none());
        assert!(v.get("Addrv6").is_none());
        assert_eq!(v["Addr"], "10.0.0.2/24");
    }

    #[test]
    fn test_endpoint_malformed_mac() {
        let raw = br#"{"id":"ep1","nid":"n1","SrcName":"macv1","MacAddress":"02:42:zz:00:00:02"}"#;
        let mut endpoint = Endpoint::empty(&MACVLAN);
        let err = endpoint.set_value(raw).unwrap_err();
        assert!(matches!(err, DecodeError::InvalidValue { field, .. } if field == "MacAddress"));
    }

    #[test]
    fn test_endpoint_malformed_addr() {
        let raw = br#"{"id":"ep1","nid":"n1","SrcName":"macv1","Addr":"fd00::2/64"}"#;
        let mut endpoint = Endpoint::empty(&MACVLAN);
        assert!(endpoint.set_value(raw).is_err());
    }

    #[test]
    fn test_endpoint_missing_nid() {
        let raw = br#"{"id":"ep1","SrcName":"macv1"}"#;
        let mut endpoint = Endpoint::empty(&MACVLAN);
        assert!(matches!(
            endpoint.set_value(raw).unwrap_err(),
            DecodeError::MissingField(f) if f == "nid"
        ));
    }

    #[test]
    fn test_keys() {
        let endpoint = Endpoint {
            id: "ep1".to_string(),
            ..Endpoint::empty(&IPVLAN)
        };
        assert_eq!(endpoint.key(), vec!["ipvlan/endpoint", "ep1"]);
        assert_eq!(endpoint.key_prefix(), vec!["ipvlan/endpoint"]);
        assert_eq!(sample_network().key(), vec!["ipvlan/network", "3f2a9c1e8b7d"]);
    }
}
