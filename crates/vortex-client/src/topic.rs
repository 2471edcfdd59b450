// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Topic descriptors and the type registration sent with `Create Topic`.

use crate::qos::QosPolicy;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Data type name of the generic JSON topic type.
pub const JSON_TOPIC_TYPE: &str = "org.omg.dds.types.JSONTopicType";

/// Registration type name of the generic JSON topic type.
pub const JSON_REGISTRATION_TYPE: &str = "org::omg::dds::types::JSONTopicType";

/// 128-bit DDS key hash, split in two 64-bit halves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct KeyHash {
    pub high: i64,
    pub low: i64,
}

impl KeyHash {
    pub fn new(high: i64, low: i64) -> Self {
        Self { high, low }
    }

    pub fn from_i16(key: i16) -> Self {
        Self::from_i64(i64::from(key))
    }

    pub fn from_i32(key: i32) -> Self {
        Self::from_i64(i64::from(key))
    }

    pub fn from_i64(key: i64) -> Self {
        Self { high: 0, low: key }
    }
}

/// How samples of a type are framed on a data channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadEncoding {
    /// The sample's JSON is the frame.
    Raw,
    /// The sample's JSON text is wrapped as `{"value": "<json>"}`.
    Holder,
}

impl PayloadEncoding {
    /// Framing used by data channels carrying `T`: bare for keyed types,
    /// held for everything else.
    pub fn of<T: TopicType>() -> Self {
        if T::KEYED {
            Self::Raw
        } else {
            Self::Holder
        }
    }
}

/// A type that can be published and subscribed through the data space.
///
/// Unkeyed types (the default) travel wrapped in a holder; keyed types are
/// sent as bare JSON and registered under their own type path.
pub trait TopicType: Serialize + DeserializeOwned + Send + 'static {
    /// Whether the type declares a DDS key.
    const KEYED: bool = false;

    /// Fully qualified type name, `.` or `::` separated.
    fn type_path() -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Key hash of this sample, if the type is keyed.
    fn key_hash(&self) -> Option<KeyHash> {
        None
    }
}

impl TopicType for serde_json::Value {}

impl TopicType for String {}

/// Type names announced to the server when a topic is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeRegistration {
    pub data_type: String,
    pub registration_type: String,
}

impl TypeRegistration {
    /// The generic JSON topic type.
    pub fn json() -> Self {
        Self {
            data_type: JSON_TOPIC_TYPE.to_string(),
            registration_type: JSON_REGISTRATION_TYPE.to_string(),
        }
    }

    /// Registration derived from `T`.
    pub fn of<T: TopicType>() -> Self {
        if T::KEYED {
            let path = T::type_path();
            Self {
                data_type: path.replace("::", "."),
                registration_type: canonical_registration_type(path),
            }
        } else {
            Self::json()
        }
    }

    /// Explicit type names.
    pub fn explicit(data_type: impl Into<String>, registration_type: &str) -> Self {
        Self {
            data_type: data_type.into(),
            registration_type: canonical_registration_type(registration_type),
        }
    }
}

/// Rewrite a `.` separated type name into the `::` form the server expects.
pub fn canonical_registration_type(name: &str) -> String {
    name.replace('.', "::")
}

/// A topic created on the server.
///
/// Immutable once returned by the provisioner. Payload framing is not a
/// property of the topic: each reader or writer picks it from its own type.
#[derive(Debug, Clone, PartialEq)]
pub struct Topic {
    pub domain_id: u32,
    pub name: String,
    pub data_type: String,
    pub registration_type: String,
    pub qos: Vec<QosPolicy>,
}

impl Topic {
    pub fn new(
        domain_id: u32,
        name: impl Into<String>,
        registration: TypeRegistration,
        qos: Vec<QosPolicy>,
    ) -> Self {
        Self {
            domain_id,
            name: name.into(),
            data_type: registration.data_type,
            registration_type: registration.registration_type,
            qos,
        }
    }

    pub fn is_json(&self) -> bool {
        self.data_type == JSON_TOPIC_TYPE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Serialize, Deserialize)]
    struct Reading {
        sensor: i32,
        value: f64,
    }

    impl TopicType for Reading {
        const KEYED: bool = true;

        fn type_path() -> &'static str {
            "sensors.Reading"
        }

        fn key_hash(&self) -> Option<KeyHash> {
            Some(KeyHash::from_i32(self.sensor))
        }
    }

    #[derive(Serialize, Deserialize)]
    struct Note {
        text: String,
    }

    impl TopicType for Note {}

    #[test]
    fn unkeyed_types_use_json_topic_type() {
        let reg = TypeRegistration::of::<Note>();
        assert_eq!(reg, TypeRegistration::json());
        assert_eq!(reg.registration_type, "org::omg::dds::types::JSONTopicType");
        assert_eq!(PayloadEncoding::of::<Note>(), PayloadEncoding::Holder);
        assert_eq!(PayloadEncoding::of::<serde_json::Value>(), PayloadEncoding::Holder);
    }

    #[test]
    fn keyed_types_register_their_own_path() {
        let reg = TypeRegistration::of::<Reading>();
        assert_eq!(reg.data_type, "sensors.Reading");
        assert_eq!(reg.registration_type, "sensors::Reading");
        assert_eq!(PayloadEncoding::of::<Reading>(), PayloadEncoding::Raw);
    }

    #[test]
    fn explicit_registration_is_canonicalized() {
        let reg = TypeRegistration::explicit("a.b.C", "a.b.C");
        assert_eq!(reg.data_type, "a.b.C");
        assert_eq!(reg.registration_type, "a::b::C");
        assert_eq!(canonical_registration_type("a::b::C"), "a::b::C");
        assert_eq!(
            TypeRegistration::explicit(JSON_TOPIC_TYPE, JSON_TOPIC_TYPE),
            TypeRegistration::json()
        );
    }

    #[test]
    fn key_hash_widens_into_low_half() {
        assert_eq!(KeyHash::from_i16(-3), KeyHash::new(0, -3));
        assert_eq!(KeyHash::from_i32(7), KeyHash::new(0, 7));
        let r = Reading {
            sensor: 42,
            value: 0.5,
        };
        assert_eq!(r.key_hash(), Some(KeyHash::new(0, 42)));
    }

    #[test]
    fn topic_carries_registration() {
        let topic = Topic::new(0, "Chat", TypeRegistration::json(), vec![]);
        assert!(topic.is_json());
        assert_eq!(topic.registration_type, JSON_REGISTRATION_TYPE);
    }
}
