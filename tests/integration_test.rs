use georecord::{Config, Error, GeoipFilter, Location, MemoryLookup, Record};
use serde_json::{json, Value};

// Values of the City test database for the addresses used below.
fn create_test_lookup() -> MemoryLookup {
    MemoryLookup::new()
        .with(
            "66.102.3.80",
            Location {
                city: Some("Mountain View".into()),
                country_name: Some("United States".into()),
                country_code: Some("US".into()),
                latitude: Some(37.4192008972168),
                longitude: Some(-122.05740356445312),
                ..Location::default()
            },
        )
        .with(
            "8.8.8.8",
            Location {
                city: Some("Mountain View".into()),
                country_name: Some("United States".into()),
                country_code: Some("US".into()),
                latitude: Some(37.38600158691406),
                longitude: Some(-122.08380126953125),
                ..Location::default()
            },
        )
        .with(
            "125.54.15.42",
            Location {
                city: Some("Tokorozawa".into()),
                country_name: Some("Japan".into()),
                country_code: Some("JP".into()),
                latitude: Some(35.799_999_237_060_55),
                longitude: Some(139.468_994_140_625),
                ..Location::default()
            },
        )
}

fn create_filter(config: &str) -> GeoipFilter<MemoryLookup> {
    let config: Config = config.parse().expect("config is valid JSON");
    GeoipFilter::new(&config, create_test_lookup()).expect("config is accepted")
}

fn configure(config: &str) -> Result<GeoipFilter<MemoryLookup>, Error> {
    let config: Config = config.parse().expect("config is valid JSON");
    GeoipFilter::new(&config, create_test_lookup())
}

fn record(value: Value) -> Record {
    value.as_object().expect("record is an object").clone()
}

/// Emit each record under `tag`, returning (tag, record) pairs.
fn run(filter: &GeoipFilter<MemoryLookup>, tag: &str, records: Vec<Value>) -> Vec<(String, Record)> {
    records
        .into_iter()
        .map(|r| filter.emit(tag, record(r)))
        .collect()
}

const CONFIG: &str = r#"{
    "geoip_lookup_key": "host",
    "enable_key_city": "geoip_city",
    "remove_tag_prefix": "input.",
    "tag": "geoip.${tag}"
}"#;

#[test]
fn test_configure() {
    assert!(matches!(configure("{}"), Err(Error::NoOutputFields)));
    assert!(matches!(
        configure(r#"{"enable_key_cities": "x"}"#),
        Err(Error::UnknownShorthand { .. })
    ));
    assert!(configure(
        r#"{"enable_key_city": "geoip_city", "remove_tag_prefix": "input.", "tag": "geoip.${tag}"}"#
    )
    .is_ok());

    // multiple key config
    assert!(configure(
        r#"{"geoip_lookup_key": "from.ip, to.ip", "enable_key_city": "from_city, to_city"}"#
    )
    .is_ok());

    // multiple key config (bad configure)
    assert!(matches!(
        configure(
            r#"{
                "geoip_lookup_key": "from.ip, to.ip",
                "enable_key_city": "from_city",
                "enable_key_region": "from_region"
            }"#
        ),
        Err(Error::KeyCountMismatch { .. })
    ));

    // invalid json structure
    assert!(matches!(
        configure(r#"{"record": {"invalid_json": "{\"foo\" => 123}"}}"#),
        Err(Error::InvalidJson { .. })
    ));
    assert!(matches!(
        configure(r#"{"record": {"invalid_json": "{\"foo\" : string, \"bar\" : 123}"}}"#),
        Err(Error::InvalidJson { .. })
    ));

    // malformed placeholders
    assert!(matches!(
        configure(r#"{"record": {"broken": "${city['host'}"}}"#),
        Err(Error::InvalidPlaceholder { .. })
    ));
    assert!(matches!(
        configure(r#"{"record": {"unknown": "${asn['host']}"}}"#),
        Err(Error::UnknownKind { .. })
    ));
}

#[test]
fn test_emit() {
    let filter = create_filter(CONFIG);
    let events = run(
        &filter,
        "input.access",
        vec![
            json!({"host": "66.102.3.80", "message": "valid ip"}),
            json!({"message": "missing field"}),
        ],
    );
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].0, "geoip.access");
    assert_eq!(events[0].1["geoip_city"], json!("Mountain View"));
    assert_eq!(events[1].1["geoip_city"], Value::Null);
}

#[test]
fn test_emit_tag_option() {
    let filter = create_filter(
        r#"{
            "geoip_lookup_key": "host",
            "record": {"geoip_city": "${city['host']}"},
            "remove_tag_prefix": "input.",
            "tag": "geoip.${tag}"
        }"#,
    );
    let events = run(
        &filter,
        "input.access",
        vec![
            json!({"host": "66.102.3.80", "message": "valid ip"}),
            json!({"message": "missing field"}),
        ],
    );
    assert_eq!(events[0].0, "geoip.access");
    assert_eq!(events[0].1["geoip_city"], json!("Mountain View"));
    assert_eq!(events[1].1["geoip_city"], Value::Null);
}

#[test]
fn test_emit_tag_parts() {
    let filter = create_filter(
        r#"{
            "geoip_lookup_key": "host",
            "record": {"geoip_city": "${city['host']}"},
            "tag": "geoip.${tag_parts[1]}.${tag_parts[2..3]}.${tag_parts[-1]}"
        }"#,
    );
    let events = run(&filter, "0.1.2.3", vec![json!({"host": "66.102.3.80"})]);
    assert_eq!(events[0].0, "geoip.1.2.3.3");
    assert_eq!(events[0].1["geoip_city"], json!("Mountain View"));
}

#[test]
fn test_emit_with_dot_key() {
    let filter = create_filter(
        r#"{
            "geoip_lookup_key": "ip.origin, ip.dest",
            "record": {
                "origin_country": "${country_code['ip.origin']}",
                "dest_country": "${country_code['ip.dest']}"
            },
            "remove_tag_prefix": "input.",
            "tag": "geoip.${tag}"
        }"#,
    );
    let events = run(
        &filter,
        "input.access",
        vec![json!({"ip.origin": "66.102.3.80", "ip.dest": "8.8.8.8"})],
    );
    assert_eq!(events[0].0, "geoip.access");
    assert_eq!(events[0].1["origin_country"], json!("US"));
    assert_eq!(events[0].1["dest_country"], json!("US"));
}

#[test]
fn test_emit_nested_attr() {
    let filter = create_filter(
        r#"{
            "geoip_lookup_key": "host.ip",
            "enable_key_city": "geoip_city",
            "remove_tag_prefix": "input.",
            "add_tag_prefix": "geoip."
        }"#,
    );
    let events = run(
        &filter,
        "input.access",
        vec![
            json!({"host": {"ip": "66.102.3.80"}, "message": "valid ip"}),
            json!({"message": "missing field"}),
        ],
    );
    assert_eq!(events[0].0, "geoip.access");
    assert_eq!(events[0].1["geoip_city"], json!("Mountain View"));
    assert_eq!(events[1].1["geoip_city"], Value::Null);
}

#[test]
fn test_emit_with_unknown_address() {
    let filter = create_filter(
        r#"{
            "geoip_lookup_key": "host",
            "record": {
                "geoip_city": "${city['host']}",
                "geopoint": "[\"${longitude['host']}\", \"${latitude['host']}\"]"
            },
            "skip_adding_null_record": false,
            "remove_tag_prefix": "input.",
            "tag": "geoip.${tag[1]}"
        }"#,
    );
    let events = run(
        &filter,
        "input.access",
        vec![
            // 203.0.113.1 is a test address described in RFC5737
            json!({"host": "203.0.113.1", "message": "invalid ip"}),
            json!({"host": "0", "message": "invalid ip"}),
        ],
    );
    for (tag, record) in &events {
        assert_eq!(tag, "geoip.access");
        assert_eq!(record.get("geoip_city"), Some(&Value::Null));
        assert_eq!(record["geopoint"], json!([null, null]));
    }
}

#[test]
fn test_emit_with_skip_unknown_address() {
    let filter = create_filter(
        r#"{
            "geoip_lookup_key": "host",
            "record": {
                "geoip_city": "${city['host']}",
                "geopoint": "[${longitude['host']}, ${latitude['host']}]"
            },
            "skip_adding_null_record": true,
            "remove_tag_prefix": "input.",
            "tag": "geoip.${tag}"
        }"#,
    );
    let events = run(
        &filter,
        "input.access",
        vec![
            json!({"host": "203.0.113.1", "message": "invalid ip"}),
            json!({"host": "0", "message": "invalid ip"}),
            json!({"host": "8.8.8.8", "message": "google public dns"}),
        ],
    );
    assert_eq!(events.len(), 3);
    for (tag, record) in &events[..2] {
        assert_eq!(tag, "geoip.access");
        assert!(!record.contains_key("geoip_city"));
        assert!(!record.contains_key("geopoint"));
    }
    assert_eq!(events[2].1["geoip_city"], json!("Mountain View"));
    assert_eq!(
        events[2].1["geopoint"],
        json!([-122.08380126953125, 37.38600158691406])
    );
}

#[test]
fn test_emit_multiple_key() {
    let filter = create_filter(
        r#"{
            "geoip_lookup_key": "from.ip, to.ip",
            "enable_key_city": "from_city, to_city",
            "remove_tag_prefix": "input.",
            "add_tag_prefix": "geoip."
        }"#,
    );
    let events = run(
        &filter,
        "input.access",
        vec![
            json!({"from": {"ip": "66.102.3.80"}, "to": {"ip": "125.54.15.42"}}),
            json!({"message": "missing field"}),
        ],
    );
    assert_eq!(events[0].0, "geoip.access");
    assert_eq!(events[0].1["from_city"], json!("Mountain View"));
    assert_eq!(events[0].1["to_city"], json!("Tokorozawa"));
    assert_eq!(events[1].1["from_city"], Value::Null);
    assert_eq!(events[1].1["to_city"], Value::Null);
}

#[test]
fn test_emit_multiple_key_multiple_record() {
    let filter = create_filter(
        r#"{
            "geoip_lookup_key": "from.ip, to.ip",
            "enable_key_city": "from_city, to_city",
            "enable_key_country_name": "from_country, to_country",
            "remove_tag_prefix": "input.",
            "add_tag_prefix": "geoip."
        }"#,
    );
    let events = run(
        &filter,
        "input.access",
        vec![
            json!({"from": {"ip": "66.102.3.80"}, "to": {"ip": "125.54.15.42"}}),
            json!({"from": {"ip": "66.102.3.80"}}),
            json!({"message": "missing field"}),
        ],
    );
    assert_eq!(events.len(), 3);
    let first = &events[0].1;
    assert_eq!(first["from_city"], json!("Mountain View"));
    assert_eq!(first["from_country"], json!("United States"));
    assert_eq!(first["to_city"], json!("Tokorozawa"));
    assert_eq!(first["to_country"], json!("Japan"));

    let second = &events[1].1;
    assert_eq!(second["from_city"], json!("Mountain View"));
    assert_eq!(second["from_country"], json!("United States"));
    assert_eq!(second["to_city"], Value::Null);
    assert_eq!(second["to_country"], Value::Null);

    for key in ["from_city", "from_country", "to_city", "to_country"] {
        assert_eq!(events[2].1[key], Value::Null, "{key}");
    }
}

#[test]
fn test_emit_record_directive() {
    let filter = create_filter(
        r#"{
            "geoip_lookup_key": "from.ip",
            "record": {
                "from_city": "${city['from.ip']}",
                "from_country": "${country_name['from.ip']}",
                "latitude": "${latitude['from.ip']}",
                "longitude": "${longitude['from.ip']}",
                "float_concat": "${latitude['from.ip']},${longitude['from.ip']}",
                "float_array": "[${longitude['from.ip']}, ${latitude['from.ip']}]",
                "float_nest": "{ \"lat\" : ${latitude['from.ip']}, \"lon\" : ${longitude['from.ip']}}",
                "string_concat": "${latitude['from.ip']},${longitude['from.ip']}",
                "string_array": "[${city['from.ip']}, ${country_name['from.ip']}]",
                "string_nest": "{ \"city\" : ${city['from.ip']}, \"country_name\" : ${country_name['from.ip']}}",
                "unknown_city": "${city['unknown_key']}",
                "undefined": "${city['undefined']}",
                "broken_array1": "[${longitude['from.ip']}, ${latitude['undefined']}]",
                "broken_array2": "[${longitude['undefined']}, ${latitude['undefined']}]"
            },
            "remove_tag_prefix": "input.",
            "tag": "geoip.${tag}"
        }"#,
    );
    let events = run(
        &filter,
        "input.access",
        vec![
            json!({"from": {"ip": "66.102.3.80"}}),
            json!({"message": "missing field"}),
        ],
    );
    assert_eq!(events.len(), 2);

    let (tag, found) = &events[0];
    assert_eq!(tag, "geoip.access");
    assert_eq!(found["from_city"], json!("Mountain View"));
    assert_eq!(found["from_country"], json!("United States"));
    assert_eq!(found["latitude"], json!(37.4192008972168));
    assert!(found["latitude"].is_f64());
    assert_eq!(found["longitude"], json!(-122.05740356445312));
    assert_eq!(found["float_concat"], json!("37.4192008972168,-122.05740356445312"));
    assert_eq!(found["float_array"], json!([-122.05740356445312, 37.4192008972168]));
    assert_eq!(
        found["float_nest"],
        json!({"lat": 37.4192008972168, "lon": -122.05740356445312})
    );
    assert_eq!(found["string_concat"], json!("37.4192008972168,-122.05740356445312"));
    assert_eq!(found["string_array"], json!(["Mountain View", "United States"]));
    assert_eq!(
        found["string_nest"],
        json!({"city": "Mountain View", "country_name": "United States"})
    );
    assert_eq!(found["unknown_city"], Value::Null);
    assert_eq!(found["undefined"], Value::Null);
    assert_eq!(found["broken_array1"], json!([-122.05740356445312, null]));
    assert_eq!(found["broken_array2"], json!([null, null]));

    let missing = &events[1].1;
    for key in ["from_city", "from_country", "latitude", "longitude", "unknown_city", "undefined"] {
        assert_eq!(missing[key], Value::Null, "{key}");
    }
    assert_eq!(missing["float_concat"], json!(","));
    assert_eq!(missing["float_array"], json!([null, null]));
    assert_eq!(missing["float_nest"], json!({"lat": null, "lon": null}));
    assert_eq!(missing["string_concat"], json!(","));
    assert_eq!(missing["string_array"], json!([null, null]));
    assert_eq!(missing["string_nest"], json!({"city": null, "country_name": null}));
    assert_eq!(missing["broken_array1"], json!([null, null]));
    assert_eq!(missing["broken_array2"], json!([null, null]));
}

#[test]
fn test_emit_record_directive_multiple_record() {
    let filter = create_filter(
        r#"{
            "geoip_lookup_key": "from.ip, to.ip",
            "record": {
                "from_city": "${city['from.ip']}",
                "to_city": "${city['to.ip']}",
                "from_country": "${country_name['from.ip']}",
                "to_country": "${country_name['to.ip']}",
                "string_array": "[${country_name['from.ip']}, ${country_name['to.ip']}]"
            },
            "remove_tag_prefix": "input.",
            "tag": "geoip.${tag}"
        }"#,
    );
    let events = run(
        &filter,
        "input.access",
        vec![
            json!({"from": {"ip": "66.102.3.80"}, "to": {"ip": "125.54.15.42"}}),
            json!({"message": "missing field"}),
        ],
    );
    let found = &events[0].1;
    assert_eq!(found["from_city"], json!("Mountain View"));
    assert_eq!(found["from_country"], json!("United States"));
    assert_eq!(found["to_city"], json!("Tokorozawa"));
    assert_eq!(found["to_country"], json!("Japan"));
    assert_eq!(found["string_array"], json!(["United States", "Japan"]));

    let missing = &events[1].1;
    assert_eq!(missing["string_array"], json!([null, null]));
}

const CONFIG_QUOTED_RECORD: &str = r#"{
    "geoip_lookup_key": "host",
    "record": {
        "location_properties": "'{ \"country_code\" : \"${country_code[\"host\"]}\", \"lat\": ${latitude[\"host\"]}, \"lon\": ${longitude[\"host\"]} }'",
        "location_string": "${latitude['host']},${longitude['host']}",
        "location_string2": "${country_code[\"host\"]}",
        "location_array": "\"[${longitude['host']},${latitude['host']}]\"",
        "location_array2": "'[${longitude[\"host\"]},${latitude[\"host\"]}]'",
        "peculiar_pattern": "'[GEOIP] message => {\"lat\":${latitude[\"host\"]}, \"lon\":${longitude[\"host\"]}}'"
    },
    "remove_tag_prefix": "input.",
    "tag": "geoip.${tag}"
}"#;

#[test]
fn test_emit_quoted_record() {
    let filter = create_filter(CONFIG_QUOTED_RECORD);
    let events = run(
        &filter,
        "input.access",
        vec![json!({"host": "66.102.3.80", "message": "valid ip"})],
    );
    let (tag, found) = &events[0];
    assert_eq!(tag, "geoip.access");
    assert_eq!(
        found["location_properties"],
        json!({"country_code": "US", "lat": 37.4192008972168, "lon": -122.05740356445312})
    );
    assert_eq!(found["location_string"], json!("37.4192008972168,-122.05740356445312"));
    assert_eq!(found["location_string2"], json!("US"));
    assert_eq!(found["location_array"], json!([-122.05740356445312, 37.4192008972168]));
    assert_eq!(found["location_array2"], json!([-122.05740356445312, 37.4192008972168]));
    assert_eq!(
        found["peculiar_pattern"],
        json!(r#"[GEOIP] message => {"lat":37.4192008972168, "lon":-122.05740356445312}"#)
    );
}

#[test]
fn test_emit_multiline_record() {
    let filter = create_filter(
        r#"{
            "geoip_lookup_key": "host",
            "record": {
                "location_properties": "{\n  \"city\": \"${city['host']}\",\n  \"country_code\": \"${country_code['host']}\",\n  \"latitude\": \"${latitude['host']}\",\n  \"longitude\": \"${longitude['host']}\"\n}"
            },
            "remove_tag_prefix": "input.",
            "tag": "geoip.${tag}"
        }"#,
    );
    let events = run(
        &filter,
        "input.access",
        vec![json!({"host": "66.102.3.80", "message": "valid ip"})],
    );
    assert_eq!(
        events[0].1["location_properties"],
        json!({
            "city": "Mountain View",
            "country_code": "US",
            "latitude": 37.4192008972168,
            "longitude": -122.05740356445312
        })
    );
}

#[test]
fn test_json_valued_record_template() {
    let filter = create_filter(
        r#"{
            "record": {
                "location": {"lat": "${latitude['host']}", "lon": "${longitude['host']}", "source": "geoip"}
            }
        }"#,
    );
    let events = run(&filter, "t", vec![json!({"host": "8.8.8.8"})]);
    assert_eq!(
        events[0].1["location"],
        json!({"lat": 37.38600158691406, "lon": -122.08380126953125, "source": "geoip"})
    );
}

#[test]
fn test_filter_keeps_tag() {
    let filter = create_filter(CONFIG);
    let out = filter.filter("input.access", record(json!({"host": "66.102.3.80"})));
    assert_eq!(out["geoip_city"], json!("Mountain View"));
    assert_eq!(out["host"], json!("66.102.3.80"));
}

#[test]
fn test_shared_across_threads() {
    let filter = create_filter(CONFIG);
    std::thread::scope(|s| {
        let handles: Vec<_> = ["66.102.3.80", "8.8.8.8", "203.0.113.1"]
            .into_iter()
            .map(|ip| {
                let filter = &filter;
                s.spawn(move || filter.emit("input.access", record(json!({"host": ip}))))
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(results[0].1["geoip_city"], json!("Mountain View"));
        assert_eq!(results[1].1["geoip_city"], json!("Mountain View"));
        assert_eq!(results[2].1["geoip_city"], Value::Null);
    });
}
