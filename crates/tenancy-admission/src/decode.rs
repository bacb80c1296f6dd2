//! Typed decoding of dynamic admission objects
//!
//! An object of a different kind is not an error: the stage simply has
//! nothing to do. An object of the right kind that fails to deserialize is a
//! contract violation by whoever sent it.

use kube::api::DynamicObject;
use kube::Resource;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// Outcome of decoding a dynamic object into `K`
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded<K> {
    /// The object is a `K`
    Decoded(K),
    /// The object is some other kind; callers treat this as a no-op
    WrongKind,
    /// The object claims to be a `K` but cannot be read as one
    Malformed(String),
}

/// Decode a dynamic object into a typed resource
pub fn decode<K>(obj: &DynamicObject) -> Decoded<K>
where
    K: Resource<DynamicType = ()> + DeserializeOwned,
{
    let Some(types) = obj.types.as_ref() else {
        return Decoded::Malformed("object has no apiVersion/kind".to_string());
    };
    if types.api_version != K::api_version(&()) || types.kind != K::kind(&()) {
        return Decoded::WrongKind;
    }

    let value = match serde_json::to_value(obj) {
        Ok(v) => v,
        Err(e) => return Decoded::Malformed(e.to_string()),
    };
    match serde_json::from_value::<K>(value) {
        Ok(typed) => Decoded::Decoded(typed),
        Err(e) => Decoded::Malformed(format!("invalid {}: {e}", K::kind(&()))),
    }
}

/// Write a typed resource back into the dynamic object it was decoded from
///
/// Fields the typed representation does not know about are kept: the typed
/// JSON is overlaid on the original, merging objects and replacing
/// everything else.
pub fn encode_into<K: Serialize>(obj: &mut DynamicObject, typed: &K) -> Result<(), String> {
    let mut merged = serde_json::to_value(&*obj).map_err(|e| e.to_string())?;
    let overlay = serde_json::to_value(typed).map_err(|e| e.to_string())?;
    overlay_json(&mut merged, overlay);
    *obj = serde_json::from_value(merged).map_err(|e| e.to_string())?;
    Ok(())
}

fn overlay_json(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => overlay_json(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}
