use serde::{Deserialize, Deserializer};

/// Keeps "key omitted" apart from "key set to null" in PATCH bodies. Use with
/// `#[serde(default, deserialize_with = "double_option")]`: omitted gives
/// `None`, `null` gives `Some(None)`.
pub fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize)]
    struct Patch {
        #[serde(default, deserialize_with = "double_option")]
        note: Option<Option<String>>,
    }

    #[test]
    fn separates_omitted_from_null() {
        let omitted: Patch = serde_json::from_str("{}").unwrap();
        assert_eq!(omitted.note, None);

        let cleared: Patch = serde_json::from_str(r#"{"note":null}"#).unwrap();
        assert_eq!(cleared.note, Some(None));

        let set: Patch = serde_json::from_str(r#"{"note":"hi"}"#).unwrap();
        assert_eq!(set.note, Some(Some("hi".to_string())));
    }

    #[test]
    fn rejects_wrong_type() {
        assert!(serde_json::from_str::<Patch>(r#"{"note":5}"#).is_err());
    }
}
