use models::device::Identity;
use rand::Rng;

use super::{pick, random_mac};
use crate::config::ProfileConfig;

/// VIN model-year codes.
const YEAR_CODES: &[u8] = b"ABCDEFGHJKLMNPRSTVWXY";

const VIN_LEN: usize = 17;

pub(super) fn automotive(
    config: &ProfileConfig,
    device_type: &str,
    index: usize,
    rng: &mut impl Rng,
) -> Identity {
    let manufacturer = pick(&config.manufacturers, &["WVWZZZ", "3VWDP7"], rng);
    let year = YEAR_CODES[rng.gen_range(0..YEAR_CODES.len())] as char;

    // Truncated or right-padded with zeros to exactly 17 characters.
    let vin: String = format!("{manufacturer}{year}{index:06}")
        .chars()
        .take(VIN_LEN)
        .collect();
    let vin = format!("{vin:0<width$}", width = VIN_LEN);

    Identity::from([
        ("mac".into(), random_mac(rng)),
        ("vin".into(), vin),
        ("device_type".into(), device_type.to_string()),
    ])
}

pub(super) fn smart_buildings(
    config: &ProfileConfig,
    device_type: &str,
    rng: &mut impl Rng,
) -> Identity {
    let oui = pick(&config.oui_prefixes, &["00:1A:2B", "DC:A6:32"], rng);
    let nic: [u8; 3] = rng.r#gen();
    let mac = format!("{oui}:{:02X}:{:02X}:{:02X}", nic[0], nic[1], nic[2]);

    Identity::from([
        ("mac".into(), mac),
        ("device_type".into(), device_type.to_string()),
    ])
}

pub(super) fn medical(
    config: &ProfileConfig,
    device_type: &str,
    index: usize,
    rng: &mut impl Rng,
) -> Identity {
    let class = pick(&config.device_classes, &["II", "III"], rng);
    let serial = format!("{index:08}");

    Identity::from([
        ("mac".into(), random_mac(rng)),
        ("fda_udi".into(), format!("FDA-{class}-{serial}")),
        ("serial_number".into(), serial),
        ("device_type".into(), device_type.to_string()),
    ])
}

pub(super) fn industrial(
    config: &ProfileConfig,
    device_type: &str,
    index: usize,
    rng: &mut impl Rng,
) -> Identity {
    let plant = pick(&config.plants, &["PLANT-A", "PLANT-B"], rng);
    let line = rng.gen_range(1..=10);

    Identity::from([
        ("mac".into(), random_mac(rng)),
        ("plant_id".into(), plant),
        ("line".into(), format!("L{line:02}")),
        ("unit".into(), format!("U{:03}", index % 100)),
        ("device_type".into(), device_type.to_string()),
    ])
}

pub(super) fn retail(
    config: &ProfileConfig,
    device_type: &str,
    index: usize,
    rng: &mut impl Rng,
) -> Identity {
    let region = pick(&config.regions, &["NA", "EU"], rng);
    let store = rng.gen_range(1000..=9999);
    let terminal = index % 100;

    Identity::from([
        ("mac".into(), random_mac(rng)),
        ("pos_id".into(), format!("POS-{region}-{store}-{terminal:02}")),
        ("region".into(), region),
        ("store_id".into(), store.to_string()),
        ("device_type".into(), device_type.to_string()),
    ])
}

pub(super) fn generic(device_type: &str, index: usize, rng: &mut impl Rng) -> Identity {
    Identity::from([
        ("mac".into(), random_mac(rng)),
        ("serial".into(), format!("DEV-{index:08}")),
        ("device_type".into(), device_type.to_string()),
    ])
}
