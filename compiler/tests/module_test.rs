#![cfg(test)]

use serde_json::json;

use wireidl_compiler::{describe, from_dict, to_dict, WireCategory};
use wireidl_ir::{Attributes, ConstantValue, Field, IdlError, Kind, Module};

/// A cache dict the way `to_dict` would emit it: canonical spec strings,
/// optional keys omitted where absent.
fn sample_dict() -> serde_json::Value {
    json!({
        "name": "frames",
        "namespace": "wire.frames",
        "imports": [],
        "structs": [
            {
                "name": "Frame",
                "fields": [
                    { "name": "id", "kind": "i32" },
                    { "name": "keyed", "kind": "b" },
                    { "name": "live", "kind": "b" },
                    { "name": "length", "kind": "i32" },
                    {
                        "name": "mode",
                        "kind": "x:wire.frames.Frame.Mode",
                        "attributes": { "MinVersion": 1 }
                    }
                ],
                "enums": [
                    {
                        "name": "Mode",
                        "values": [
                            { "name": "RAW" },
                            { "name": "DELTA", "value": 3 }
                        ]
                    }
                ]
            },
            {
                "name": "Batch",
                "fields": [
                    { "name": "frames", "kind": "a:x:wire.frames.Frame" },
                    { "name": "labels", "kind": "m[s][a:i32]" },
                    { "name": "checksum", "kind": "a16:u8", "ordinal": 7 }
                ]
            }
        ],
        "unions": [
            {
                "name": "Payload",
                "fields": [
                    { "name": "frame", "kind": "x:wire.frames.Frame" },
                    { "name": "text", "kind": "s" }
                ]
            }
        ],
        "interfaces": [
            {
                "name": "FrameSink",
                "methods": [
                    {
                        "name": "Push",
                        "parameters": [
                            { "name": "frame", "kind": "?x:wire.frames.Frame" }
                        ]
                    },
                    {
                        "name": "Flush",
                        "parameters": [],
                        "response_parameters": [
                            { "name": "written", "kind": "u64" }
                        ],
                        "ordinal": 9
                    }
                ]
            }
        ],
        "enums": [
            {
                "name": "Status",
                "values": [
                    { "name": "OK" },
                    { "name": "CLOSED" }
                ]
            }
        ],
        "constants": [
            { "name": "MAX_FRAMES", "kind": "u32", "value": 4096 }
        ],
        "attributes": { "Stable": true }
    })
}

#[test]
fn dict_round_trip_is_lossless() {
    let dict = sample_dict();
    let module = from_dict(&dict).expect("from_dict failed");
    let reencoded = to_dict(&module).expect("to_dict failed");
    assert_eq!(reencoded, dict);
}

#[test]
fn from_dict_returns_a_packed_module() {
    let module = from_dict(&sample_dict()).expect("from_dict failed");
    let frame = module.structs[0].borrow();
    let layout = frame.layout.as_ref().expect("Frame was not packed");

    // int32 id; bool keyed; bool live; int32 length;
    let by_name = |name: &str| {
        layout
            .placements
            .iter()
            .find(|p| frame.fields[p.field_index].name == name)
            .expect("missing placement")
    };
    assert_eq!((by_name("id").offset, by_name("id").bit), (0, None));
    assert_eq!((by_name("keyed").offset, by_name("keyed").bit), (4, Some(0)));
    assert_eq!((by_name("live").offset, by_name("live").bit), (4, Some(1)));
    assert_eq!((by_name("length").offset, by_name("length").bit), (8, None));

    // The [MinVersion=1] enum field lands after the version-0 payload and
    // the versioned sizes reflect it.
    assert_eq!(by_name("mode").min_version, 1);
    assert_eq!(layout.versions.len(), 2);
    assert_eq!(layout.versions[0].version, 0);
    assert_eq!(layout.versions[0].num_fields, 4);
    assert_eq!(layout.versions[0].num_bytes, 24);

    let payload = module.unions[0].borrow();
    let union_layout = payload.layout.as_ref().expect("Payload was not packed");
    assert_eq!(union_layout.total_size, 16);
    assert_eq!(union_layout.tags, vec![(0, 0), (1, 1)]);
}

#[test]
fn methods_reconstruct_with_ordinals_and_responses() {
    let module = from_dict(&sample_dict()).expect("from_dict failed");
    let sink = module.interfaces[0].borrow();
    assert_eq!(sink.resolved_ordinals(), vec![0, 9]);
    assert!(sink.methods[0].response_parameters.is_none());
    let response = sink.methods[1].response_parameters.as_ref().unwrap();
    assert_eq!(response[0].kind, Kind::UInt64);
    assert!(sink.methods[0].parameters[0].kind.is_nullable());
}

#[test]
fn unqualified_nested_references_resolve_inner_scope_first() {
    let mut dict = sample_dict();
    // Add a top-level enum that shadows the nested Frame.Mode by name, and
    // reference the nested one unqualified from inside Frame.
    dict["enums"].as_array_mut().unwrap().push(json!({
        "name": "Mode",
        "values": [ { "name": "OTHER" } ]
    }));
    dict["structs"][0]["fields"][4]["kind"] = json!("x:Mode");

    let module = from_dict(&dict).expect("from_dict failed");
    let frame = module.structs[0].borrow();
    assert_eq!(frame.fields[4].kind.spec(), "x:wire.frames.Frame.Mode");
}

#[test]
fn builder_modules_survive_the_dict_round_trip() {
    let mut exporter = Module::new("geometry", "geo");
    let point = exporter.add_struct("Point", Attributes::new()).unwrap();
    point.borrow_mut().fields.push(Field::new("x", Kind::Int32));
    point.borrow_mut().fields.push(Field::new("y", Kind::Int32));

    let mut module = Module::new("drawing", "draw");
    module.import_module(&exporter).unwrap();
    let canvas = module.add_struct("Canvas", Attributes::new()).unwrap();
    let point_kind = module.lookup_kind("x:geo.Point").unwrap();
    let mut origin = Field::new("origin", point_kind.make_nullable().unwrap());
    origin.default = Some(ConstantValue::Str("identity".to_string()));
    canvas.borrow_mut().fields.push(origin);

    let dict = to_dict(&module).expect("to_dict failed");
    assert_eq!(dict["structs"][0]["imported_from"], json!("geometry"));
    assert_eq!(dict["structs"][1]["fields"][0]["kind"], json!("?x:geo.Point"));

    let rebuilt = from_dict(&dict).expect("from_dict failed");
    let reencoded = to_dict(&rebuilt).expect("to_dict failed");
    assert_eq!(reencoded, dict);
}

#[test]
fn descriptors_come_straight_from_the_reconstructed_graph() {
    let module = from_dict(&sample_dict()).expect("from_dict failed");
    let batch = module.structs[1].borrow();

    let labels = describe(&batch.fields[1].kind, batch.fields[1].default.as_ref());
    assert_eq!(labels.wire_category, WireCategory::Map);
    assert!(labels.map_validate_params.is_some());

    let checksum = describe(&batch.fields[2].kind, None);
    assert_eq!(checksum.wire_category, WireCategory::Array);
    assert_eq!(checksum.array_validate_params.unwrap().expected_length, Some(16));
}

#[test]
fn invalid_dicts_produce_no_module() {
    let mut dict = sample_dict();
    dict["structs"][0]["fields"][0]["kind"] = json!("q");
    assert!(matches!(from_dict(&dict), Err(IdlError::ParseError { .. })));

    let mut dict = sample_dict();
    dict["structs"][1]["fields"][1]["kind"] = json!("m[a:i32][s]");
    assert!(matches!(from_dict(&dict), Err(IdlError::InvariantViolation { .. })));

    let mut dict = sample_dict();
    dict["structs"][0]["fields"][0]["kind"] = json!("x:Nowhere");
    assert!(matches!(from_dict(&dict), Err(IdlError::ResolutionError { .. })));

    let mut dict = sample_dict();
    dict["structs"][0]["fields"][0]["attributes"] = json!({ "MinVersion": 3 });
    assert!(matches!(from_dict(&dict), Err(IdlError::VersionError { .. })));

    let mut dict = sample_dict();
    dict["interfaces"][0]["methods"][1]["ordinal"] = json!(0);
    assert!(matches!(from_dict(&dict), Err(IdlError::InvariantViolation { .. })));
}
