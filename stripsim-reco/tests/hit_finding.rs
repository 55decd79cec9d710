#![allow(clippy::cast_precision_loss, clippy::unreadable_literal)]
use approx::assert_relative_eq;
use stripsim_core::{
    AsicParams, Cluster, DetectorContext, ModuleParams, SensorConditions, SensorDssd,
    SensorGeometry, SensorTransform, Side, StripLayout, StsAddress,
};
use stripsim_reco::{HitBuilder, Reconstruction, ReconstructionConfig};

const PITCH: f64 = 0.0058;
const PITCH_BACK: f64 = 0.005;
const DX: f64 = PITCH * 1024.0;

fn stereo_geometry(front: f64, back: f64) -> SensorGeometry {
    SensorGeometry {
        dx: DX,
        dy: 2.0,
        dz: 0.03,
        layout: StripLayout::Stereo {
            pitch: PITCH,
            stereo_front: front,
            stereo_back: back,
        },
    }
}

fn orthogonal_geometry() -> SensorGeometry {
    SensorGeometry {
        dx: DX,
        dy: 4.0,
        dz: 0.03,
        layout: StripLayout::Orthogonal {
            pitch_front: PITCH,
            pitch_back: PITCH_BACK,
        },
    }
}

fn prepare(geometry: SensorGeometry) -> SensorDssd {
    SensorDssd::prepare(geometry, SensorConditions::default(), 0, 1024).unwrap()
}

fn setup(geometries: &[SensorGeometry]) -> (DetectorContext, StsAddress) {
    let mut ctx = DetectorContext::new();
    let module = StsAddress::module(0, 1, 1, 2).unwrap();
    ctx.add_module(module, ModuleParams::with_asic(AsicParams::default()).unwrap())
        .unwrap();
    for &geometry in geometries {
        ctx.add_sensor(
            module,
            geometry,
            SensorConditions::default(),
            SensorTransform::identity(),
        )
        .unwrap();
    }
    ctx.prepare().unwrap();
    (ctx, module)
}

fn cluster(module: StsAddress, side: Side, position: f64, time: f64) -> Cluster {
    let mut cluster = Cluster::new(module, side);
    cluster.push(0);
    cluster.set_properties(2.0e4, position, 0.3, time, 3.5);
    cluster
}

#[test]
fn test_orthogonal_hit() {
    let sensor = prepare(orthogonal_geometry());
    let config = ReconstructionConfig::default();
    let builder = HitBuilder::new(StsAddress::default(), &sensor, &config);
    let clusters = vec![
        cluster(StsAddress::default(), Side::Front, 100.0, 40.0),
        cluster(StsAddress::default(), Side::Back, 1024.0 + 200.0, 44.0),
    ];
    let (hits, stats) = builder.build(&clusters, &[0, 1]).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(stats.pairs, 1);
    let hit = &hits[0];
    assert_relative_eq!(hit.x, 100.5 * PITCH - 0.5 * DX, epsilon = 1e-12);
    assert_relative_eq!(hit.y, 200.5 * PITCH_BACK - 2.0, epsilon = 1e-12);
    assert_relative_eq!(hit.covariance.xx, (0.3 * PITCH).powi(2), epsilon = 1e-15);
    assert_relative_eq!(hit.covariance.yy, (0.3 * PITCH_BACK).powi(2), epsilon = 1e-15);
    assert_relative_eq!(hit.covariance.xy, 0.0);
    assert_relative_eq!(hit.time, 42.0);
    assert_relative_eq!(hit.time_error, 0.5 * 3.5_f64.hypot(3.5), epsilon = 1e-12);
    assert!(hit.is_two_sided());
}

#[test]
fn test_vertical_front_matches_orthogonal() {
    let stereo = prepare(stereo_geometry(0.0, 7.5));
    let orthogonal = prepare(orthogonal_geometry());
    let config = ReconstructionConfig::default();
    let module = StsAddress::default();
    let clusters = vec![
        cluster(module, Side::Front, 100.0, 0.0),
        cluster(module, Side::Back, 1024.0 + 80.0, 0.0),
    ];

    let (stereo_hits, _) = HitBuilder::new(module, &stereo, &config)
        .build(&clusters, &[0, 1])
        .unwrap();
    let (orthogonal_hits, _) = HitBuilder::new(module, &orthogonal, &config)
        .build(&clusters, &[0, 1])
        .unwrap();
    assert_eq!(stereo_hits.len(), 1);
    assert_eq!(orthogonal_hits.len(), 1);
    assert_relative_eq!(stereo_hits[0].x, orthogonal_hits[0].x, epsilon = 1e-12);
    assert_relative_eq!(
        stereo_hits[0].covariance.xx,
        orthogonal_hits[0].covariance.xx,
        epsilon = 1e-15
    );
    // y follows from the back strip crossing the vertical front strip
    let tan = 7.5_f64.to_radians().tan();
    let expected_y = 2.0 - (100.5 - 80.5) * PITCH / tan - 1.0;
    assert_relative_eq!(stereo_hits[0].y, expected_y, epsilon = 1e-9);
}

#[test]
fn test_steep_stereo_gives_ghosts() {
    // Back strips at 75 degrees span more than the sensor width
    let sensor = prepare(stereo_geometry(0.0, 75.0));
    let config = ReconstructionConfig::default();
    let module = StsAddress::default();
    let clusters = vec![
        cluster(module, Side::Front, 171.9, 0.0),
        cluster(module, Side::Back, 1024.0 + 100.0, 0.0),
    ];
    let (hits, stats) = HitBuilder::new(module, &sensor, &config)
        .build(&clusters, &[0, 1])
        .unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(stats.pairs, 1);
    assert_eq!(stats.hits, 2);
    let x = 172.4 * PITCH - 0.5 * DX;
    for hit in &hits {
        assert_relative_eq!(hit.x, x, epsilon = 1e-9);
        assert!(hit.y.abs() <= 1.0);
        assert_eq!(hit.front_cluster, Some(0));
        assert_eq!(hit.back_cluster, Some(1));
    }
    let tan = 75.0_f64.to_radians().tan();
    assert_relative_eq!((hits[0].y - hits[1].y).abs(), DX / tan, epsilon = 1e-9);
}

#[test]
fn test_daisy_chain_serves_every_sensor() {
    let geometry = stereo_geometry(0.0, 7.5);
    let (ctx, module) = setup(&[geometry, geometry]);
    let reco = Reconstruction::new(&ctx, ReconstructionConfig::default()).unwrap();
    let clusters = vec![
        cluster(module, Side::Front, 100.0, 0.0),
        cluster(module, Side::Back, 1024.0 + 80.0, 0.0),
    ];
    let (hits, stats) = reco.find_hits(&clusters).unwrap();
    // The back channel reads a strip shifted by dy * tan / pitch on the second
    // sensor, whose line misses the front strip inside the active area.
    assert_eq!(stats.hits.pairs, 2);
    assert_eq!(stats.hits.no_intersection, 1);
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].address, ctx.sensors()[0].address);
}

#[test]
fn test_single_cluster_hits_orthogonal() {
    let (ctx, module) = setup(&[orthogonal_geometry()]);
    let config = ReconstructionConfig::default().with_single_cluster_hits(true);
    let reco = Reconstruction::new(&ctx, config).unwrap();
    let clusters = vec![
        cluster(module, Side::Front, 100.0, 5.0),
        cluster(module, Side::Back, 1024.0 + 200.0, 9.0),
    ];
    let (hits, stats) = reco.find_hits(&clusters).unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(stats.hits.pairs, 0);

    let front = hits.iter().find(|h| h.front_cluster.is_some()).unwrap();
    assert_relative_eq!(front.x, 100.5 * PITCH - 0.5 * DX, epsilon = 1e-12);
    assert_relative_eq!(front.y, 0.0);
    assert_relative_eq!(front.covariance.yy, 16.0 / 12.0, epsilon = 1e-12);
    assert_relative_eq!(front.time, 5.0);

    let back = hits.iter().find(|h| h.back_cluster.is_some()).unwrap();
    assert_relative_eq!(back.x, 0.0);
    assert_relative_eq!(back.y, 200.5 * PITCH_BACK - 2.0, epsilon = 1e-12);
    assert_relative_eq!(back.covariance.xx, DX * DX / 12.0, epsilon = 1e-12);
    assert!(!back.is_two_sided());
}

#[test]
fn test_pitch_override() {
    let sensor = prepare(stereo_geometry(0.0, 7.5));
    let config = ReconstructionConfig::default().with_pitch_override(Some(0.006));
    let builder = HitBuilder::new(StsAddress::default(), &sensor, &config);
    let (x, error) = builder
        .cluster_coordinate(&cluster(StsAddress::default(), Side::Front, 10.0, 0.0))
        .unwrap()
        .unwrap();
    assert_relative_eq!(x, 10.5 * 0.006, epsilon = 1e-12);
    assert_relative_eq!(error, 0.3 * 0.006, epsilon = 1e-12);
}

#[test]
fn test_orthogonal_unconnected_channel_skipped() {
    // 800 back strips on 1024 channels per side
    let sensor = prepare(orthogonal_geometry());
    let config = ReconstructionConfig::default();
    let builder = HitBuilder::new(StsAddress::default(), &sensor, &config);
    let m = StsAddress::default();
    let clusters = vec![
        cluster(m, Side::Front, 100.0, 0.0),
        cluster(m, Side::Back, 1024.0 + 900.0, 0.0),
        cluster(m, Side::Back, 1024.0 + 799.0, 0.0),
    ];
    assert!(builder.cluster_coordinate(&clusters[1]).unwrap().is_none());

    let (hits, stats) = builder.build(&clusters, &[0, 1, 2]).unwrap();
    assert_eq!(stats.unconnected, 1);
    assert_eq!(stats.pairs, 1);
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].back_cluster, Some(2));
    assert!(sensor.is_inside(hits[0].x, hits[0].y));
}

#[test]
fn test_orthogonal_hit_outside_sensor_rejected() {
    let sensor = prepare(orthogonal_geometry());
    // Strip 1000 at a 0.01 pitch lies beyond the right edge
    let config = ReconstructionConfig::default().with_pitch_override(Some(0.01));
    let builder = HitBuilder::new(StsAddress::default(), &sensor, &config);
    let m = StsAddress::default();
    let clusters = vec![
        cluster(m, Side::Front, 1000.0, 0.0),
        cluster(m, Side::Back, 1024.0 + 100.0, 0.0),
    ];
    let (hits, stats) = builder.build(&clusters, &[0, 1]).unwrap();
    assert!(hits.is_empty());
    assert_eq!(stats.no_intersection, 1);
}

#[test]
fn test_unknown_module_clusters_counted() {
    let (ctx, _) = setup(&[stereo_geometry(0.0, 7.5)]);
    let reco = Reconstruction::new(&ctx, ReconstructionConfig::default()).unwrap();
    let stranger = StsAddress::module(5, 0, 0, 0).unwrap();
    let (hits, stats) = reco
        .find_hits(&[cluster(stranger, Side::Front, 1.0, 0.0)])
        .unwrap();
    assert!(hits.is_empty());
    assert_eq!(stats.clusters_unknown_module, 1);
}
