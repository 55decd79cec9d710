#![allow(clippy::cast_precision_loss, clippy::unreadable_literal)]
use approx::assert_relative_eq;
use stripsim_core::{
    AsicParams, DetectorContext, Digi, Match, ModuleParams, Origin, SensorConditions,
    SensorGeometry, SensorTransform, Side, StripLayout, StsAddress,
};
use stripsim_reco::{Reconstruction, ReconstructionConfig, TimeCut};

const PITCH: f64 = 0.0058;

fn stereo_geometry() -> SensorGeometry {
    SensorGeometry {
        dx: PITCH * 1024.0,
        dy: 2.0,
        dz: 0.03,
        layout: StripLayout::Stereo {
            pitch: PITCH,
            stereo_front: 0.0,
            stereo_back: 7.5,
        },
    }
}

fn orthogonal_geometry() -> SensorGeometry {
    SensorGeometry {
        dx: PITCH * 1024.0,
        dy: 4.0,
        dz: 0.03,
        layout: StripLayout::Orthogonal {
            pitch_front: PITCH,
            pitch_back: 0.005,
        },
    }
}

fn setup(geometry: SensorGeometry) -> (DetectorContext, StsAddress) {
    let mut ctx = DetectorContext::new();
    let module = StsAddress::module(1, 2, 0, 3).unwrap();
    ctx.add_module(module, ModuleParams::with_asic(AsicParams::default()).unwrap())
        .unwrap();
    ctx.add_sensor(
        module,
        geometry,
        SensorConditions::default(),
        SensorTransform::identity(),
    )
    .unwrap();
    ctx.prepare().unwrap();
    (ctx, module)
}

fn digi(module: StsAddress, channel: u16, time: u64, adc: u16) -> Digi {
    Digi::new(
        module,
        channel,
        time,
        adc,
        Match::single(Origin::new(0, 0, i32::from(channel)), 1.0),
    )
}

#[test]
fn test_isolated_digi_single_cluster() {
    let (ctx, module) = setup(stereo_geometry());
    let reco = Reconstruction::new(&ctx, ReconstructionConfig::default()).unwrap();
    let digis = vec![digi(module, 300, 1000, 10)];
    let (clusters, stats) = reco.find_clusters(&digis).unwrap();
    assert_eq!(clusters.len(), 1);
    assert_eq!(clusters[0].size(), 1);
    assert_relative_eq!(clusters[0].position, 300.0);
    assert_eq!(clusters[0].side, Side::Front);
    assert_eq!(clusters[0].module_address(), module);
    assert_eq!(stats.clusters.clusters, 1);
}

#[test]
fn test_round_the_edge_stereo_module() {
    let (ctx, module) = setup(stereo_geometry());
    let digis = vec![digi(module, 1024, 500, 8), digi(module, 2047, 502, 8)];

    let reco = Reconstruction::new(&ctx, ReconstructionConfig::default()).unwrap();
    let (clusters, _) = reco.find_clusters(&digis).unwrap();
    assert_eq!(clusters.len(), 1);
    assert_eq!(clusters[0].digis, vec![1, 0]);
    assert_eq!(clusters[0].side, Side::Back);

    let config = ReconstructionConfig::default().with_connect_edge(Side::Back, false);
    let reco = Reconstruction::new(&ctx, config).unwrap();
    let (clusters, _) = reco.find_clusters(&digis).unwrap();
    assert_eq!(clusters.len(), 2);
    assert!(clusters.iter().all(|c| c.size() == 1));
}

#[test]
fn test_orthogonal_module_never_wraps() {
    let (ctx, module) = setup(orthogonal_geometry());
    let reco = Reconstruction::new(&ctx, ReconstructionConfig::default()).unwrap();
    let digis = vec![digi(module, 0, 500, 8), digi(module, 1023, 500, 8)];
    let (clusters, _) = reco.find_clusters(&digis).unwrap();
    assert_eq!(clusters.len(), 2);
}

#[test]
fn test_unsorted_input_and_duplicates() {
    let (ctx, module) = setup(stereo_geometry());
    let reco = Reconstruction::new(&ctx, ReconstructionConfig::default()).unwrap();
    let digis = vec![
        digi(module, 101, 1010, 6),
        digi(module, 100, 1000, 6),
        // Same channel 5 ns later: ignored
        digi(module, 100, 1005, 6),
        digi(module, 102, 1004, 6),
        // Same channels much later: a second cluster
        digi(module, 100, 9000, 6),
    ];
    let (clusters, stats) = reco.find_clusters(&digis).unwrap();
    assert_eq!(stats.clusters.processed, 5);
    assert_eq!(stats.clusters.ignored, 1);
    assert_eq!(clusters.len(), 2);
    assert_eq!(clusters[0].digis, vec![1, 0, 3]);
    assert_relative_eq!(clusters[0].position, 101.0, epsilon = 1e-12);
    assert_eq!(clusters[1].digis, vec![4]);
}

#[test]
fn test_absolute_window_splits() {
    let (ctx, module) = setup(stereo_geometry());
    let digis = vec![digi(module, 50, 1000, 6), digi(module, 51, 1030, 6)];
    let config = ReconstructionConfig::default().with_digi_time_cut(TimeCut::absolute(10.0));
    let reco = Reconstruction::new(&ctx, config).unwrap();
    assert_eq!(reco.find_clusters(&digis).unwrap().0.len(), 2);

    let config = ReconstructionConfig::default().with_digi_time_cut(TimeCut::absolute(50.0));
    let reco = Reconstruction::new(&ctx, config).unwrap();
    assert_eq!(reco.find_clusters(&digis).unwrap().0.len(), 1);
}

#[test]
fn test_unknown_module_and_bad_channel() {
    let (ctx, module) = setup(stereo_geometry());
    let reco = Reconstruction::new(&ctx, ReconstructionConfig::default()).unwrap();
    let stranger = StsAddress::module(9, 0, 0, 0).unwrap();
    let (clusters, stats) = reco.find_clusters(&[digi(stranger, 3, 0, 1)]).unwrap();
    assert!(clusters.is_empty());
    assert_eq!(stats.digis_unknown_module, 1);

    assert!(reco.find_clusters(&[digi(module, 4096, 0, 1)]).is_err());
}

#[test]
fn test_parallel_matches_sequential() {
    let (ctx, module) = setup(stereo_geometry());
    let digis: Vec<Digi> = (0..400u16)
        .map(|i| digi(module, (i * 37) % 2048, u64::from(i) * 3, i % 31))
        .collect();
    let parallel = Reconstruction::new(&ctx, ReconstructionConfig::default())
        .unwrap()
        .process(&digis)
        .unwrap();
    let sequential = Reconstruction::new(&ctx, ReconstructionConfig::default().with_parallel(false))
        .unwrap()
        .process(&digis)
        .unwrap();
    assert_eq!(parallel.clusters, sequential.clusters);
    assert_eq!(parallel.hits, sequential.hits);
    assert_eq!(parallel.statistics, sequential.statistics);
}

#[test]
fn test_unprepared_setup_rejected() {
    let mut ctx = DetectorContext::new();
    let module = StsAddress::module(0, 0, 0, 0).unwrap();
    ctx.add_module(module, ModuleParams::with_asic(AsicParams::default()).unwrap())
        .unwrap();
    ctx.add_sensor(
        module,
        stereo_geometry(),
        SensorConditions::default(),
        SensorTransform::identity(),
    )
    .unwrap();
    assert!(Reconstruction::new(&ctx, ReconstructionConfig::default()).is_err());
}
