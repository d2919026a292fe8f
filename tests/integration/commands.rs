//! Control-plane command flows decoded from JSON.

use portset_rs::{AdtCmd, BitmapPortSet, CreateCmd, CreateOptions, Reply, SetError};

fn create(json: &str) -> BitmapPortSet {
    let cmd: CreateCmd = serde_json::from_str(json).unwrap();
    BitmapPortSet::from_create(&cmd, CreateOptions::default()).unwrap()
}

fn run(set: &BitmapPortSet, json: &str) -> Result<Reply, SetError> {
    let cmd: AdtCmd = serde_json::from_str(json).unwrap();
    set.execute(&cmd)
}

#[test]
fn reversed_create_reports_normalized_header() {
    let set = create(r#"{"first_port":1024,"last_port":80}"#);
    let Reply::Header(head) = run(&set, r#"{"op":"head"}"#).unwrap() else {
        panic!("expected header");
    };
    assert_eq!((head.first_port, head.last_port), (80, 1024));
    assert_eq!(head.timeout, None);
    assert!(!head.with_counters);
}

#[test]
fn range_add_delete_and_list() {
    let set = create(r#"{"first_port":1,"last_port":1024}"#);
    run(&set, r#"{"op":"add","port":110,"port_to":100}"#).unwrap();
    run(&set, r#"{"op":"del","port":105}"#).unwrap();

    let Reply::Listed(listed) = run(&set, r#"{"op":"list"}"#).unwrap() else {
        panic!("expected list");
    };
    let ports: Vec<u16> = listed.entries.iter().map(|e| e.port).collect();
    assert_eq!(ports, vec![100, 101, 102, 103, 104, 106, 107, 108, 109, 110]);
    assert!(listed.entries.iter().all(|e| e.timeout.is_none() && e.counters.is_none()));
}

#[test]
fn strict_and_tolerant_readd() {
    let set = create(r#"{"first_port":1,"last_port":100}"#);
    run(&set, r#"{"op":"add","port":10}"#).unwrap();
    assert!(matches!(
        run(&set, r#"{"op":"add","port":10}"#),
        Err(SetError::AlreadyExists { port: 10 })
    ));
    assert_eq!(
        run(&set, r#"{"op":"add","port":10,"exists_ok":true}"#).unwrap(),
        Reply::Ok
    );
}

#[test]
fn test_outside_domain_is_range_error() {
    let set = create(r#"{"first_port":100,"last_port":200}"#);
    assert!(matches!(
        run(&set, r#"{"op":"test","port":99}"#),
        Err(SetError::Range { port: 99, first: 100, last: 200 })
    ));
    assert!(matches!(
        run(&set, r#"{"op":"test","port":201}"#),
        Err(SetError::Range { port: 201, .. })
    ));
}

#[test]
fn counters_on_plain_set_are_rejected() {
    let set = create(r#"{"first_port":1,"last_port":100,"timeout":60}"#);
    assert!(matches!(
        run(&set, r#"{"op":"add","port":5,"packets":1}"#),
        Err(SetError::CountersNotSupported)
    ));
}

#[test]
fn flush_then_list_is_empty() {
    let set = create(r#"{"first_port":1,"last_port":100,"with_counters":true}"#);
    run(&set, r#"{"op":"add","port":1,"port_to":100}"#).unwrap();
    run(&set, r#"{"op":"flush"}"#).unwrap();
    let Reply::Listed(listed) = run(&set, r#"{"op":"list"}"#).unwrap() else {
        panic!("expected list");
    };
    assert!(listed.entries.is_empty());
    assert!(listed.header.with_counters);
}
