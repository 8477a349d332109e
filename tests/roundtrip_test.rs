use formdrop::{
    decode_chunk, encode, DecodeConfig, EncodeConfig, FormData, IoSink, Part, PartSpec, Scalar,
};
use std::fs;
use std::io::Read;
use tempfile::TempDir;

fn decode_config(dir: &TempDir) -> DecodeConfig {
    DecodeConfig {
        file_template: dir.path().join("part"),
        ..DecodeConfig::default()
    }
}

#[test]
fn test_scalar_forms_round_trip() {
    let cases: Vec<(&str, Vec<Scalar>)> = vec![
        ("text", vec![Scalar::from("plain value")]),
        ("multi", vec![Scalar::from("first"), Scalar::from("second"), Scalar::from("third")]),
        ("numbers", vec![Scalar::Int(42), Scalar::Float(2.75)]),
        ("flags", vec![Scalar::Bool(true), Scalar::Bool(false)]),
        ("empty", vec![Scalar::from("")]),
        ("lines", vec![Scalar::from("a\r\nb\r\nc")]),
    ];

    let mut form = FormData::new();
    for (name, values) in &cases {
        for value in values {
            form.add_text(name, value.clone());
        }
    }

    let mut sink = IoSink(Vec::new());
    encode(&mut sink, &mut form, "round-trip-boundary", EncodeConfig::default()).unwrap();

    let decoded =
        decode_chunk(&sink.0, "round-trip-boundary", DecodeConfig::default()).unwrap();

    for (name, values) in &cases {
        let got: Vec<_> = decoded.get_all(name).iter().filter_map(Part::text).collect();
        let want: Vec<_> = values.iter().map(Scalar::to_string).collect();
        assert_eq!(got, want, "field {name:?} did not survive the round trip");
    }
}

#[test]
fn test_file_part_round_trip() {
    let dir = TempDir::new().unwrap();
    let source = dir.path().join("input.bin");
    let payload: Vec<u8> = (0..50_000u32).map(|i| (i * 7 % 256) as u8).collect();
    fs::write(&source, &payload).unwrap();

    let mut form = FormData::new();
    form.add_file("blob", &source);
    form.add_text("label", "attached");

    let mut sink = IoSink(Vec::new());
    encode(&mut sink, &mut form, "B1234", EncodeConfig::default()).unwrap();

    let mut decoded = decode_chunk(&sink.0, "B1234", decode_config(&dir)).unwrap();
    assert_eq!(decoded.get("label").and_then(Part::text), Some("attached"));

    let mut parts = decoded.take("blob");
    assert_eq!(parts[0].filename.as_deref(), Some("input.bin"));

    let mut got = Vec::new();
    parts[0].file_mut().unwrap().read_to_end(&mut got).unwrap();
    assert_eq!(got, payload, "file body corrupted in transit");
}

#[test]
fn test_round_trip_with_tiny_decoder_chunks() {
    let mut form = FormData::new();
    form.add_text("a", "alpha").add_text("a", "beta");
    form.add_text("b", 9i64);

    let mut sink = IoSink(Vec::new());
    encode(&mut sink, &mut form, "B", EncodeConfig::default()).unwrap();

    let baseline = decode_chunk(&sink.0, "B", DecodeConfig::default()).unwrap();

    for chunk_size in [1, 2, 3, 13] {
        let cfg = DecodeConfig { chunk_size, ..DecodeConfig::default() };
        let form = decode_chunk(&sink.0, "B", cfg).unwrap();

        for name in ["a", "b"] {
            let got: Vec<_> = form.get_all(name).iter().filter_map(Part::text).collect();
            let want: Vec<_> = baseline.get_all(name).iter().filter_map(Part::text).collect();
            assert_eq!(got, want, "chunk_size {chunk_size} changed field {name:?}");
        }
    }
}

#[test]
fn test_generated_boundary_round_trips() {
    let boundary = formdrop::generate_boundary();

    let mut form = FormData::new();
    form.add_part(
        "payload",
        PartSpec { data: Some(Scalar::from("generated boundary test")), ..PartSpec::default() },
    );

    let mut sink = IoSink(Vec::new());
    encode(&mut sink, &mut form, &boundary, EncodeConfig::default()).unwrap();

    let decoded = decode_chunk(&sink.0, &boundary, DecodeConfig::default()).unwrap();
    assert_eq!(
        decoded.get("payload").and_then(Part::text),
        Some("generated boundary test")
    );
}
