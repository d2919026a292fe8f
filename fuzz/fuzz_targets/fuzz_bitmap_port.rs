#![no_main]

use libfuzzer_sys::fuzz_target;

use portset_rs::{AddExt, BitmapPortSet, CreateOptions, SetConfig, SetError};

// Interprets a byte stream as a control-plane operation sequence against a
// `BitmapPortSet`, checking every result against a `Vec<bool>` model.
//
// Byte layout:
// - Bytes 0..4 → `first_port`, `last_port` (little-endian u16, may be reversed)
// - Remaining bytes as `(opcode, lo, hi)` triples, operand = `u16` from lo/hi:
//   - 0 → `add(operand, exists_ok = false)`
//   - 1 → `add(operand, exists_ok = true)`
//   - 2 → `del(operand)`
//   - 3 → `test(operand)`
//   - 4 → `flush()`
//   - _ → `list()` compared in full
fuzz_target!(|data: &[u8]| {
    if data.len() < 4 {
        return;
    }
    let a = u16::from_le_bytes([data[0], data[1]]);
    let b = u16::from_le_bytes([data[2], data[3]]);
    let (first, last) = if a > b { (b, a) } else { (a, b) };

    let set = match BitmapPortSet::create(SetConfig::new(a, b, None, false), CreateOptions::default()) {
        Ok(set) => set,
        Err(_) => return,
    };
    let mut model = vec![false; usize::from(last - first) + 1];
    let slot = |port: u16| (first..=last).contains(&port).then(|| usize::from(port - first));

    for op in data[4..].chunks_exact(3) {
        let raw = u16::from_le_bytes([op[1], op[2]]);
        // Fold most operands into the domain so mutations actually land.
        let port = if raw & 0x8000 == 0 {
            first.wrapping_add(raw % (last - first).saturating_add(1))
        } else {
            raw
        };

        match op[0] % 6 {
            code @ (0 | 1) => {
                let exists_ok = code == 1;
                let got = set.add(port, &AddExt::default(), exists_ok);
                match slot(port) {
                    None => assert!(matches!(got, Err(SetError::Range { .. }))),
                    Some(i) if model[i] && !exists_ok => {
                        assert!(matches!(got, Err(SetError::AlreadyExists { .. })))
                    }
                    Some(i) => {
                        assert!(got.is_ok(), "add({port}) failed: {got:?}");
                        model[i] = true;
                    }
                }
            }
            2 => {
                let got = set.del(port);
                match slot(port) {
                    None => assert!(matches!(got, Err(SetError::Range { .. }))),
                    Some(i) => {
                        assert_eq!(got.is_ok(), model[i], "del({port}) mismatch");
                        model[i] = false;
                    }
                }
            }
            3 => match slot(port) {
                None => assert!(set.test(port).is_err()),
                Some(i) => assert_eq!(set.test(port).ok(), Some(model[i]), "test({port})"),
            },
            4 => {
                set.flush();
                model.fill(false);
            }
            _ => {
                let listed: Vec<u16> = set.list().iter().map(|e| e.port).collect();
                let expected: Vec<u16> = model
                    .iter()
                    .enumerate()
                    .filter(|(_, &on)| on)
                    .map(|(i, _)| first + i as u16)
                    .collect();
                assert_eq!(listed, expected, "list mismatch");
            }
        }
    }

    let expected_count = model.iter().filter(|&&on| on).count();
    assert_eq!(set.list().len(), expected_count, "final count mismatch");
});
