mod common;

use std::sync::Arc;

use serde_json::Value;

use signalrig::observability::EventEmitter;
use signalrig::persistence::{CycleRecorder, JsonlCycleLog, MemoryCycleLog};
use signalrig::signal::TrafficController;

fn read_events(path: &std::path::Path) -> Vec<Value> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect()
}

#[tokio::test(start_paused = true)]
async fn cycle_emits_selection_and_completion_events() {
    let dir = tempfile::tempdir().unwrap();
    let events_path = dir.path().join("events.jsonl");
    let events = Arc::new(EventEmitter::from_file(&events_path).unwrap());
    let controller = TrafficController::builder()
        .timing(common::exact_timing())
        .events(Arc::clone(&events))
        .recorder(Arc::new(MemoryCycleLog::new()))
        .build();

    controller.update_vehicle_counts([0, 0, 0, 1, 0, 0]);
    controller.run_one_cycle().await.unwrap();
    controller.emergency_stop().await;
    drop(controller);
    drop(events);

    let lines = read_events(&events_path);
    let types: Vec<&str> = lines.iter().map(|e| e["type"].as_str().unwrap()).collect();
    assert_eq!(types, vec!["PhaseSelected", "CycleCompleted", "EmergencyStop"]);

    let sequences: Vec<u64> = lines.iter().map(|e| e["sequence"].as_u64().unwrap()).collect();
    assert!(sequences.windows(2).all(|w| w[0] < w[1]));

    assert_eq!(lines[0]["phase_name"], "CROSS_D");
    assert_eq!(lines[0]["green_time_secs"], 8);
    assert_eq!(lines[1]["outcome"], "completed");
    assert_eq!(lines[1]["duration_ms"], 13_000);
    assert_eq!(lines[2]["was_running"], false);
}

#[tokio::test(start_paused = true)]
async fn loop_start_and_stop_events_share_a_run_id() {
    let dir = tempfile::tempdir().unwrap();
    let events_path = dir.path().join("events.jsonl");
    let events = Arc::new(EventEmitter::from_file(&events_path).unwrap());
    let controller = TrafficController::builder().events(Arc::clone(&events)).build();

    controller.start().await.unwrap();
    controller.stop().await;
    drop(controller);
    drop(events);

    let lines = read_events(&events_path);
    assert_eq!(lines[0]["type"], "ControllerStarted");
    assert_eq!(lines[0]["phases"], 4);
    let stopped = lines.last().unwrap();
    assert_eq!(stopped["type"], "ControllerStopped");
    assert_eq!(stopped["reason"], "requested");
    assert_eq!(stopped["run_id"], lines[0]["run_id"]);
}

#[tokio::test(start_paused = true)]
async fn cycle_log_file_receives_completed_cycles() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cycles.jsonl");
    let log: Arc<dyn CycleRecorder> = Arc::new(JsonlCycleLog::open(&path).unwrap());
    let controller = TrafficController::builder()
        .timing(common::exact_timing())
        .recorder(log)
        .build();

    controller.update_vehicle_counts([0, 2, 0, 0, 0, 0]);
    controller.run_one_cycle().await.unwrap();
    controller.update_vehicle_counts([0, 0, 0, 0, 0, 1]);
    controller.run_one_cycle().await.unwrap();

    let records = JsonlCycleLog::read_all(&path).unwrap();
    let names: Vec<&str> = records.iter().map(|r| r.phase_name.as_str()).collect();
    assert_eq!(names, vec!["AVENUE_OUTBOUND", "AVENUE_INBOUND"]);
    assert_eq!(records[0].green_time_secs, 13);
    assert_eq!(records[1].total_vehicles, 1);
}
