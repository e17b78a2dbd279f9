//! Column encoding for a note's key points.
//!
//! Key points are stored in a single TEXT column as a JSON array of strings.
//! JSON quoting keeps items containing commas, quotes or newlines intact and
//! distinguishes `[]` from `[""]`.

use crate::database::DatabaseError;

/// Encodes key points for storage.
pub fn encode(points: &[String]) -> Result<String, DatabaseError> {
    serde_json::to_string(points)
        .map_err(|e| DatabaseError::ConstraintViolation(format!("keyPoints not encodable: {}", e)))
}

/// Decodes a stored keyPoints column.
///
/// Anything other than a JSON array of strings means the row was written by
/// something other than this store and is reported as an integrity error.
pub fn decode(raw: &str) -> Result<Vec<String>, DatabaseError> {
    serde_json::from_str(raw)
        .map_err(|e| DatabaseError::Integrity(format!("keyPoints column is not a string array: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(points: Vec<String>) {
        let encoded = encode(&points).unwrap();
        assert_eq!(decode(&encoded).unwrap(), points);
    }

    #[test]
    fn test_empty_and_single_empty_string_are_distinct() {
        let empty = encode(&[]).unwrap();
        let one_empty = encode(&[String::new()]).unwrap();
        assert_ne!(empty, one_empty);

        round_trip(vec![]);
        round_trip(vec![String::new()]);
    }

    #[test]
    fn test_delimiter_like_content_survives() {
        round_trip(vec![
            "a,b".to_string(),
            "".to_string(),
            "\"quoted\"".to_string(),
            "line\nbreak".to_string(),
            "[\"nested\"]".to_string(),
            "unicode ✓ 日本".to_string(),
        ]);
    }

    #[test]
    fn test_order_is_preserved() {
        round_trip(vec!["third".into(), "first".into(), "second".into()]);
    }

    #[test]
    fn test_decode_rejects_legacy_comma_joined_text() {
        assert!(matches!(
            decode("Point 1,Point 2"),
            Err(DatabaseError::Integrity(_))
        ));
        assert!(matches!(decode("[1, 2]"), Err(DatabaseError::Integrity(_))));
    }
}
