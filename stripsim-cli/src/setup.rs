//! JSON input of the `simulate` command: detector setup and events.

use crate::{CliError, Result};
use serde::Deserialize;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use stripsim_core::{
    DetectorContext, ModuleParams, Origin, SensorConditions, SensorGeometry, SensorTransform,
    StsAddress, TrajectorySegment,
};

#[derive(Debug, Deserialize)]
pub struct SetupFile {
    pub modules: Vec<ModuleEntry>,
}

#[derive(Debug, Deserialize)]
pub struct ModuleEntry {
    #[serde(default)]
    pub unit: u32,
    #[serde(default)]
    pub ladder: u32,
    #[serde(default)]
    pub half_ladder: u32,
    #[serde(default)]
    pub module: u32,
    pub sensors: Vec<SensorEntry>,
}

#[derive(Debug, Deserialize)]
pub struct SensorEntry {
    pub geometry: SensorGeometry,
    #[serde(default)]
    pub conditions: SensorConditions,
    #[serde(default)]
    pub translation: [f64; 3],
}

#[derive(Debug, Deserialize)]
pub struct EventsFile {
    pub events: Vec<EventEntry>,
}

#[derive(Debug, Deserialize)]
pub struct EventEntry {
    /// Event start [ns].
    #[serde(default)]
    pub time: f64,
    #[serde(default)]
    pub segments: Vec<SegmentEntry>,
}

/// A segment referring to its sensor by position in the setup file.
#[derive(Debug, Deserialize)]
pub struct SegmentEntry {
    pub module: usize,
    #[serde(default)]
    pub sensor: usize,
    pub entry: [f64; 3],
    pub exit: [f64; 3],
    #[serde(default = "default_momentum")]
    pub momentum: [f64; 3],
    pub energy_loss: f64,
    #[serde(default = "default_pdg")]
    pub pdg: i32,
    #[serde(default)]
    pub time: f64,
}

fn default_momentum() -> [f64; 3] {
    [0.0, 0.0, 1.0]
}

fn default_pdg() -> i32 {
    211
}

pub fn read_json<T: serde::de::DeserializeOwned, P: AsRef<Path>>(path: P) -> Result<T> {
    let file = File::open(path)?;
    Ok(serde_json::from_reader(BufReader::new(file))?)
}

/// Builds and prepares the setup. Returns the sensor addresses per module
/// in file order.
pub fn build_context(
    setup: &SetupFile,
    params: &ModuleParams,
) -> Result<(DetectorContext, Vec<Vec<StsAddress>>)> {
    let mut ctx = DetectorContext::new();
    let mut addresses = Vec::with_capacity(setup.modules.len());
    for entry in &setup.modules {
        let module = StsAddress::module(entry.unit, entry.ladder, entry.half_ladder, entry.module)?;
        ctx.add_module(module, params.clone())?;
        let sensors = entry
            .sensors
            .iter()
            .map(|s| {
                ctx.add_sensor(
                    module,
                    s.geometry,
                    s.conditions,
                    SensorTransform::translation(s.translation),
                )
            })
            .collect::<stripsim_core::Result<Vec<_>>>()?;
        addresses.push(sensors);
    }
    ctx.prepare()?;
    Ok((ctx, addresses))
}

/// Resolves the segments of one event. Provenance is (0, event, segment).
pub fn event_segments(
    event: &EventEntry,
    event_index: usize,
    addresses: &[Vec<StsAddress>],
) -> Result<Vec<TrajectorySegment>> {
    let entry = i32::try_from(event_index).map_err(|_| CliError::Input("too many events".into()))?;
    event
        .segments
        .iter()
        .enumerate()
        .map(|(i, s)| {
            let address = addresses
                .get(s.module)
                .and_then(|sensors| sensors.get(s.sensor))
                .copied()
                .ok_or_else(|| {
                    CliError::Input(format!(
                        "event {event_index} segment {i}: no sensor {} in module {}",
                        s.sensor, s.module
                    ))
                })?;
            let index = i32::try_from(i).map_err(|_| CliError::Input("too many segments".into()))?;
            Ok(TrajectorySegment {
                address,
                entry: s.entry,
                exit: s.exit,
                momentum: s.momentum,
                energy_loss: s.energy_loss,
                pdg: s.pdg,
                time: s.time,
                origin: Origin::new(0, entry, index),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use stripsim_core::AsicParams;

    const SETUP: &str = r#"{
        "modules": [{
            "ladder": 1,
            "sensors": [
                { "geometry": { "dx": 5.9392, "dy": 2.0, "dz": 0.03,
                  "layout": { "kind": "stereo", "pitch": 0.0058,
                              "stereo_front": 0.0, "stereo_back": 7.5 } } },
                { "geometry": { "dx": 5.9392, "dy": 2.0, "dz": 0.03,
                  "layout": { "kind": "stereo", "pitch": 0.0058,
                              "stereo_front": 0.0, "stereo_back": 7.5 } },
                  "translation": [0.0, 2.0, 0.0] }
            ]
        }]
    }"#;

    #[test]
    fn test_build_context_from_json() {
        let setup: SetupFile = serde_json::from_str(SETUP).unwrap();
        let params = ModuleParams::with_asic(AsicParams::default()).unwrap();
        let (ctx, addresses) = build_context(&setup, &params).unwrap();
        assert_eq!(ctx.nof_modules(), 1);
        assert_eq!(ctx.nof_sensors(), 2);
        assert_eq!(addresses[0].len(), 2);
        assert_eq!(addresses[0][1].sensor(), 1);
        assert_eq!(addresses[0][1].ladder(), 1);
        assert!(ctx.sensor_dssd(addresses[0][1]).is_ok());
    }

    #[test]
    fn test_event_segments() {
        let setup: SetupFile = serde_json::from_str(SETUP).unwrap();
        let params = ModuleParams::with_asic(AsicParams::default()).unwrap();
        let (_, addresses) = build_context(&setup, &params).unwrap();
        let events: EventsFile = serde_json::from_str(
            r#"{ "events": [ { "time": 100.0, "segments": [
                { "module": 0, "sensor": 1, "entry": [0.1, 0.2, -0.015],
                  "exit": [0.1, 0.2, 0.015], "energy_loss": 8.0e-5 } ] } ] }"#,
        )
        .unwrap();
        let segments = event_segments(&events.events[0], 3, &addresses).unwrap();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].address, addresses[0][1]);
        assert_eq!(segments[0].origin, Origin::new(0, 3, 0));
        assert_eq!(segments[0].pdg, 211);

        let bad: EventsFile = serde_json::from_str(
            r#"{ "events": [ { "segments": [
                { "module": 2, "entry": [0, 0, 0], "exit": [0, 0, 0], "energy_loss": 0 } ] } ] }"#,
        )
        .unwrap();
        assert!(event_segments(&bad.events[0], 0, &addresses).is_err());
    }
}
