fn main() {
    println!("Run `cargo test -p wire-compat` to execute wire compatibility tests.");
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use cirrus_protocol::{
        AbortUploadRequest, CompleteUploadRequest, CompleteUploadResponse, FileObject,
        FilePurpose, FileType, InitiateUploadRequest, InitiateUploadResponse,
    };

    /// Returns the path to the fixtures directory.
    fn fixtures_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures")
    }

    /// Loads a fixture JSON file and returns it as a `serde_json::Value`.
    fn load_fixture(name: &str) -> serde_json::Value {
        let path = fixtures_dir().join(name);
        let data = fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("failed to read fixture {}: {e}", path.display()));
        serde_json::from_str(&data)
            .unwrap_or_else(|e| panic!("failed to parse fixture {}: {e}", path.display()))
    }

    /// Deserializes a fixture into a Rust type, re-serializes it, and compares
    /// the JSON values (order-independent).
    fn roundtrip_test<T>(name: &str) -> T
    where
        T: serde::de::DeserializeOwned + serde::Serialize,
    {
        let fixture = load_fixture(name);
        let parsed: T = serde_json::from_value(fixture.clone())
            .unwrap_or_else(|e| panic!("failed to deserialize {name}: {e}"));
        let reserialized = serde_json::to_value(&parsed)
            .unwrap_or_else(|e| panic!("failed to re-serialize {name}: {e}"));
        assert_eq!(
            fixture, reserialized,
            "roundtrip mismatch for {name}:\n  wire: {fixture}\n  Rust: {reserialized}"
        );
        parsed
    }

    // --- Multipart session ---

    #[test]
    fn fixture_initiate_request() {
        let req = roundtrip_test::<InitiateUploadRequest>("initiate_request.json");
        assert_eq!(req.file_type, FileType::Jsonl);
        assert_eq!(req.number_of_parts, 25);
    }

    #[test]
    fn fixture_initiate_response() {
        let resp = roundtrip_test::<InitiateUploadResponse>("initiate_response.json");
        assert_eq!(resp.parts.len(), 2);
        assert!(resp.parts[0].upload_url.contains("partNumber=1"));
        assert!(resp.parts[1].headers.is_empty(), "missing headers should default to empty");
    }

    #[test]
    fn fixture_complete_request() {
        let req = roundtrip_test::<CompleteUploadRequest>("complete_request.json");
        let numbers: Vec<u32> = req.parts.iter().map(|p| p.part_number).collect();
        assert_eq!(numbers, vec![1, 2]);
    }

    #[test]
    fn fixture_complete_response() {
        let resp = roundtrip_test::<CompleteUploadResponse>("complete_response.json");
        assert_eq!(resp.file.bytes, 6_442_450_944);
        assert_eq!(resp.file.processed, Some(true));
    }

    #[test]
    fn fixture_abort_request() {
        roundtrip_test::<AbortUploadRequest>("abort_request.json");
    }

    // --- File objects ---

    #[test]
    fn fixture_file_object_minimal() {
        let file = roundtrip_test::<FileObject>("file_object_minimal.json");
        assert_eq!(file.purpose, FilePurpose::Eval);
        assert!(file.created_at.is_none());
        assert!(file.file_type.is_none());
    }

    #[test]
    fn file_object_ignores_unknown_fields() {
        let json = r#"{
            "id": "file-2",
            "filename": "rows.parquet",
            "bytes": 99,
            "purpose": "batch-api",
            "FileType": "parquet",
            "status": "uploaded",
            "deleted": false
        }"#;
        let file: FileObject = serde_json::from_str(json).unwrap();
        assert_eq!(file.object, "file", "missing object should default to \"file\"");
        assert_eq!(file.purpose, FilePurpose::BatchApi);
        assert!(file.file_type.is_none());
    }

    #[test]
    fn unknown_purpose_is_rejected() {
        let json = r#"{"id": "f", "filename": "a.jsonl", "bytes": 1, "purpose": "pretrain"}"#;
        assert!(serde_json::from_str::<FileObject>(json).is_err());
    }

    #[test]
    fn legacy_initiate_request_without_filename() {
        let json = r#"{
            "file_size": 10,
            "file_type": "csv",
            "purpose": "eval",
            "number_of_parts": 1
        }"#;
        let req: InitiateUploadRequest = serde_json::from_str(json).unwrap();
        assert!(req.filename.is_empty(), "missing filename should default to empty");
        assert!(!serde_json::to_string(&req).unwrap().contains("filename"));
    }
}
