use super::Payload;
use crate::error::NotifyError;

/// Serialize a payload into the JSON request body.
pub fn encode(payload: &Payload) -> Result<Vec<u8>, NotifyError> {
    Ok(serde_json::to_vec(payload)?)
}

/// Parse a JSON body back into a payload.
pub fn decode(bytes: &[u8]) -> Result<Payload, NotifyError> {
    Ok(serde_json::from_slice(bytes)?)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::payload::{Attachment, Color, View};

    fn encode_value(payload: &Payload) -> serde_json::Value {
        serde_json::from_slice(&encode(payload).unwrap()).unwrap()
    }

    #[test]
    fn minimal_payload_has_only_text() {
        let body = encode(&Payload::new("deploy finished")).unwrap();
        assert_eq!(body, br#"{"text":"deploy finished"}"#);
    }

    #[test]
    fn empty_text_is_still_emitted() {
        assert_eq!(encode_value(&Payload::new("")), json!({ "text": "" }));
    }

    #[test]
    fn build_failed_matches_wire_format() {
        let payload = Payload::new("Build failed").with_attachment(
            Attachment::new()
                .with_title("Error")
                .with_color(Color::Danger),
        );
        let body = String::from_utf8(encode(&payload).unwrap()).unwrap();
        assert_eq!(
            body,
            r#"{"text":"Build failed","attachments":[{"title":"Error","color":"danger"}]}"#
        );
    }

    #[test]
    fn view_uses_wire_names() {
        let payload = Payload::new("report").with_attachment(
            Attachment::new().with_view(View::html("<table></table>", 640, 480)),
        );
        assert_eq!(
            encode_value(&payload),
            json!({
                "text": "report",
                "attachments": [
                    { "views": { "html": { "inline": "<table></table>", "width": 640, "height": 480 } } }
                ]
            })
        );
    }

    #[test]
    fn absent_fields_are_omitted_and_decode_as_none() {
        let payload = Payload::new("x").with_attachment(Attachment::new().with_color(Color::Good));
        let value = encode_value(&payload);
        let attachment = value["attachments"][0].as_object().unwrap();
        assert_eq!(attachment.len(), 1);
        assert!(!attachment.contains_key("title"));
        assert!(!attachment.contains_key("views"));

        let decoded = decode(&encode(&payload).unwrap()).unwrap();
        assert_eq!(decoded.attachments[0].title, None);
        assert_eq!(decoded.attachments[0].view, None);
        assert_eq!(decoded, payload);
    }

    #[test]
    fn attachment_order_is_preserved() {
        let payload = Payload::new("ordered").with_attachments(vec![
            Attachment::new().with_title("A"),
            Attachment::new().with_title("B"),
            Attachment::new().with_title("C"),
        ]);
        let value = encode_value(&payload);
        let titles: Vec<_> = value["attachments"]
            .as_array()
            .unwrap()
            .iter()
            .map(|a| a["title"].as_str().unwrap())
            .collect();
        assert_eq!(titles, vec!["A", "B", "C"]);
    }

    #[test]
    fn encoding_is_deterministic() {
        let payload = Payload::new("same").with_attachment(
            Attachment::new()
                .with_title("t")
                .with_color(Color::Hex("#00ff00".into()))
                .with_view(View::html("<p/>", 1, 2)),
        );
        assert_eq!(encode(&payload).unwrap(), encode(&payload).unwrap());
    }

    #[test]
    fn decode_accepts_missing_attachments() {
        let decoded = decode(br#"{"text":"hello"}"#).unwrap();
        assert_eq!(decoded, Payload::new("hello"));
    }

    #[test]
    fn decode_rejects_invalid_color() {
        let err = decode(br#"{"text":"x","attachments":[{"color":"chartreuse"}]}"#).unwrap_err();
        assert!(matches!(err, NotifyError::Serialization { .. }), "{err}");
    }

    #[test]
    fn decode_rejects_missing_text() {
        assert!(decode(br#"{"attachments":[]}"#).is_err());
    }
}
