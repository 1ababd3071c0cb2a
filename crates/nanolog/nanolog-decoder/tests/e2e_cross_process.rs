//! End-to-end cross-process exercise: a real, separate producer process
//! (`demos/producer-demo`) writes a buffer file and exits; this test then
//! opens that file with `Decoder` against the producer's own binary on
//! disk, the actual offline-decode scenario the spec describes (spec
//! §4.7, §8 scenario S1) rather than the same-process stand-in the unit
//! tests in `lib.rs` use.

use nanolog_decoder::Decoder;
use std::io::Write;
use std::process::Command;
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_path(name: &str) -> std::path::PathBuf {
    let ts = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_nanos();
    std::env::temp_dir().join(format!("nanolog_e2e_{name}_{ts}"))
}

#[test]
fn cross_process_producer_decodes_to_tick_and_done() {
    let buf_path = temp_path("buf");
    let config_path = temp_path("config.toml");

    let mut config_file = std::fs::File::create(&config_path).unwrap();
    writeln!(config_file, r#"shm_path = "{}""#, buf_path.display()).unwrap();
    writeln!(config_file, "capacity = 2048").unwrap();
    drop(config_file);

    let producer_exe = env!("CARGO_BIN_EXE_producer-demo");
    let status = Command::new(producer_exe)
        .arg(&config_path)
        .status()
        .expect("spawn producer-demo");
    assert!(status.success(), "producer-demo exited with {status}");

    let decoder = Decoder::open(&buf_path, std::path::Path::new(producer_exe), None).unwrap();
    let records = decoder.decode_records();

    assert_eq!(records.len(), 1001, "1000 ticks + one done record");
    assert_eq!(records[0].message.as_deref(), Ok("tick"));
    assert_eq!(records[0].arg1, 0);
    assert_eq!(records[999].message.as_deref(), Ok("tick"));
    assert_eq!(records[999].arg1, 999);
    assert_eq!(records[1000].message.as_deref(), Ok("done"));
    assert_eq!(records[1000].arg1, 0);
    assert_eq!(records[1000].arg2, 0);

    let _ = std::fs::remove_file(&buf_path);
    let _ = std::fs::remove_file(&config_path);
}
