use chrono::{Days, Utc};
use models::device::Inventory;
use rand::Rng;
use serde_json::{Value, json};

use super::pick_value;

fn list_or(snapshot: &Inventory, key: &str, fallback: &[&str]) -> Value {
    match snapshot.get(key) {
        Some(Value::Array(values)) if !values.is_empty() => Value::Array(values.clone()),
        _ => json!(fallback),
    }
}

fn counter(snapshot: &Inventory, key: &str) -> u64 {
    snapshot.get(key).and_then(Value::as_u64).unwrap_or(0)
}

pub(super) fn automotive(snapshot: &mut Inventory, rng: &mut impl Rng) {
    let variant = pick_value(snapshot.get("oem_variant"), "standard", rng);
    snapshot.insert("oem_variant".into(), variant);
    snapshot.insert("odometer_km".into(), json!(rng.gen_range(0..=200_000u64)));
}

pub(super) fn automotive_telemetry(snapshot: &mut Inventory, rng: &mut impl Rng) {
    let odometer = counter(snapshot, "odometer_km") + rng.gen_range(0..=120u64);
    let voltage = (rng.gen_range(11.5..=14.5f64) * 100.0).round() / 100.0;
    snapshot.insert("odometer_km".into(), json!(odometer));
    snapshot.insert("battery_voltage".into(), json!(voltage));
}

pub(super) fn smart_buildings(snapshot: &mut Inventory, rng: &mut impl Rng) {
    let zone = pick_value(snapshot.get("zone_types"), "hvac", rng);
    snapshot.insert("zone_type".into(), zone);
    snapshot.insert("floor".into(), json!(rng.gen_range(1..=50)));
    snapshot.insert("room_count".into(), json!(rng.gen_range(1..=20)));
}

pub(super) fn smart_buildings_telemetry(snapshot: &mut Inventory, rng: &mut impl Rng) {
    let temperature = (rng.gen_range(18.0..=26.0f64) * 10.0).round() / 10.0;
    snapshot.insert("temperature_c".into(), json!(temperature));
    snapshot.insert("occupancy".into(), json!(rng.gen_range(0..=100)));
}

pub(super) fn medical(snapshot: &mut Inventory, rng: &mut impl Rng) {
    let calibration_due = Utc::now()
        .date_naive()
        .checked_add_days(Days::new(rng.gen_range(30..=365)))
        .map(|date| date.to_string())
        .unwrap_or_default();

    let compliance = list_or(snapshot, "compliance", &["FDA-510k"]);
    snapshot.insert("compliance_standards".into(), compliance);
    snapshot.insert("calibration_due".into(), json!(calibration_due));
    snapshot.insert("software_validated".into(), json!(true));
}

pub(super) fn medical_telemetry(snapshot: &mut Inventory, rng: &mut impl Rng) {
    let self_test = if rng.gen_bool(0.98) { "passed" } else { "degraded" };
    snapshot.insert("battery_pct".into(), json!(rng.gen_range(20..=100)));
    snapshot.insert("self_test".into(), json!(self_test));
}

pub(super) fn industrial(snapshot: &mut Inventory, rng: &mut impl Rng) {
    let protocols = list_or(snapshot, "protocols", &["modbus"]);
    snapshot.insert("supported_protocols".into(), protocols);
    snapshot.insert("plc_connected".into(), json!(rng.gen_bool(0.5)));
    snapshot.insert("uptime_hours".into(), json!(rng.gen_range(0..=8760u64)));
}

pub(super) fn industrial_telemetry(snapshot: &mut Inventory, rng: &mut impl Rng) {
    let uptime = counter(snapshot, "uptime_hours") + 1;
    let cpu_temp = (rng.gen_range(35.0..=85.0f64) * 10.0).round() / 10.0;
    snapshot.insert("uptime_hours".into(), json!(uptime));
    snapshot.insert("cpu_temp_c".into(), json!(cpu_temp));
}

pub(super) fn retail(snapshot: &mut Inventory, rng: &mut impl Rng) {
    let modules = list_or(snapshot, "payment_modules", &["chip"]);
    snapshot.insert("payment_modules".into(), modules);
    snapshot.insert("receipt_printer".into(), json!(rng.gen_bool(0.5)));
}

pub(super) fn retail_telemetry(snapshot: &mut Inventory, rng: &mut impl Rng) {
    let transactions = counter(snapshot, "transactions_today") + rng.gen_range(0..=5u64);
    snapshot.insert("transactions_today".into(), json!(transactions));
}
