use mapscout::index::{AreaAreaIndexGenerator, AreaIndexGenerator};
use mapscout::progress::SilentProgress;
use mapscout::service::{
    AREA_AREA_INDEX_FILE, AREA_NODE_INDEX_FILE, AREA_WAY_INDEX_FILE, BOUNDING_BOX_FILE, TYPES_FILE,
    WATER_INDEX_FILE, write_bounding_box,
};
use mapscout::{
    AreaIndexConfig, AreaSearchParameter, Breaker, DBInstance, DBLoadJob, Database,
    DatabaseConfig, GeoBox, GeoCoord, GroundTileType, JobEvent, Magnification, MapData,
    MapService, MapServiceConfig, MapscoutError, ThreadedBreaker, TileObject, TypeConfig,
    TypeDefinition, TypeInfo, WaterIndexConfig, WaterIndexGenerator,
};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;

const AMENITY: u16 = 1;
const HIGHWAY: u16 = 2;
const LANDUSE: u16 = 3;

fn map_box() -> GeoBox {
    GeoBox::from_bounds(50.0, 14.0, 50.5, 14.5)
}

fn point(lat: f64, lon: f64) -> GeoBox {
    GeoBox::new(GeoCoord::new(lat, lon), GeoCoord::new(lat, lon))
}

fn build_database(dir: &Path, with_water: bool) {
    let mut types = TypeConfig::new();
    types.register(TypeInfo::new(AMENITY, "amenity").with_node()).unwrap();
    types.register(TypeInfo::new(HIGHWAY, "highway").with_way()).unwrap();
    types.register(TypeInfo::new(LANDUSE, "landuse").with_area()).unwrap();
    types.save(dir.join(TYPES_FILE)).unwrap();

    write_bounding_box(dir.join(BOUNDING_BOX_FILE), &map_box()).unwrap();

    let mut nodes = AreaIndexGenerator::new(AreaIndexConfig::default());
    nodes.add(AMENITY, point(50.05, 14.05), 100).unwrap();
    nodes.add(AMENITY, point(50.42, 14.37), 101).unwrap();
    nodes.write(&mut SilentProgress, &dir.join(AREA_NODE_INDEX_FILE)).unwrap();

    let mut ways = AreaIndexGenerator::new(AreaIndexConfig::default());
    ways.add(HIGHWAY, GeoBox::from_bounds(50.01, 14.01, 50.45, 14.3), 200)
        .unwrap();
    ways.write(&mut SilentProgress, &dir.join(AREA_WAY_INDEX_FILE)).unwrap();

    let mut areas = AreaAreaIndexGenerator::new(14).unwrap();
    areas
        .add(LANDUSE, GeoBox::from_bounds(50.1, 14.1, 50.2, 14.2), 300)
        .unwrap();
    areas.write(&mut SilentProgress, &dir.join(AREA_AREA_INDEX_FILE)).unwrap();

    if with_water {
        WaterIndexGenerator::new(WaterIndexConfig::default().with_levels(14, 14))
            .generate(
                &mut SilentProgress,
                Vec::new(),
                &[],
                &map_box(),
                &dir.join(WATER_INDEX_FILE),
            )
            .unwrap();
    }
}

fn offsets(objects: &[TileObject]) -> BTreeSet<u64> {
    objects.iter().map(|o| o.offset).collect()
}

fn type_definition(database: &Database) -> TypeDefinition {
    TypeDefinition::from_type_config(&database.type_config().unwrap())
}

fn assert_map_data(data: &MapData) {
    assert_eq!(offsets(&data.nodes), BTreeSet::from([100, 101]));
    assert_eq!(offsets(&data.ways), BTreeSet::from([200]));
    assert_eq!(offsets(&data.areas), BTreeSet::from([300]));
    assert_eq!(data.nodes.len(), 2);
    assert_eq!(data.ways.len(), 1);
    assert_eq!(data.areas.len(), 1);
    assert!(data.areas.iter().all(|o| o.type_id == LANDUSE));
}

#[test]
fn test_map_service_loads_missing_tiles() {
    let _ = env_logger::builder().is_test(true).try_init();
    let dir = TempDir::new().unwrap();
    build_database(dir.path(), false);

    let database = Arc::new(Database::open(dir.path(), &DatabaseConfig::default()).unwrap());
    let types = type_definition(&database);
    let service = MapService::new(Arc::clone(&database), MapServiceConfig::default()).unwrap();

    let notifications = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&notifications);
    let callback = service.register_tile_state_callback(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let tiles = service.lookup_tiles(&Magnification::from_level(10), &map_box());
    assert_eq!(tiles.len(), 12);
    assert!(tiles.iter().all(|t| !t.is_complete()));

    service
        .load_missing_tile_data(&AreaSearchParameter::new(), &types, &tiles)
        .unwrap();
    assert!(tiles.iter().all(|t| t.is_complete()));
    // Once before loading and once when complete.
    assert_eq!(notifications.load(Ordering::SeqCst), 2 * tiles.len());

    let mut data = MapData::new();
    service.add_tile_data_to_map_data(&tiles, &mut data);
    assert_map_data(&data);
    assert!(data.ground_tiles.is_empty());

    // Complete tiles are not loaded again.
    service
        .load_missing_tile_data(&AreaSearchParameter::new(), &types, &tiles)
        .unwrap();
    assert_eq!(notifications.load(Ordering::SeqCst), 2 * tiles.len());

    assert!(service.deregister_tile_state_callback(callback));
    assert!(!service.deregister_tile_state_callback(callback));

    service.invalidate_cache();
    assert!(tiles.iter().all(|t| !t.is_complete()));
}

#[test]
fn test_map_service_loads_ground_tiles() {
    let dir = TempDir::new().unwrap();
    build_database(dir.path(), true);

    let database = Arc::new(Database::open(dir.path(), &DatabaseConfig::default()).unwrap());
    let types = type_definition(&database);
    let service = MapService::new(Arc::clone(&database), MapServiceConfig::default()).unwrap();

    let tiles = service.lookup_tiles(&Magnification::from_level(10), &map_box());
    service
        .load_missing_tile_data(&AreaSearchParameter::new(), &types, &tiles)
        .unwrap();

    let mut data = MapData::new();
    service.add_tile_data_to_map_data(&tiles, &mut data);
    assert_map_data(&data);
    assert!(data.ground_tiles.iter().any(|t| t.tile_type == GroundTileType::Water));
    assert!(
        data.ground_tiles
            .iter()
            .all(|t| matches!(t.tile_type, GroundTileType::Water | GroundTileType::Unknown))
    );
}

#[test]
fn test_aborted_load_leaves_tiles_incomplete() {
    let dir = TempDir::new().unwrap();
    build_database(dir.path(), false);

    let database = Arc::new(Database::open(dir.path(), &DatabaseConfig::default()).unwrap());
    let types = type_definition(&database);
    let service = MapService::new(Arc::clone(&database), MapServiceConfig::default()).unwrap();
    let tiles = service.lookup_tiles(&Magnification::from_level(10), &map_box());

    let breaker = Arc::new(ThreadedBreaker::new());
    breaker.abort();
    let parameter = AreaSearchParameter::new().with_breaker(breaker);

    let result = service.load_missing_tile_data(&parameter, &types, &tiles);
    assert!(matches!(result, Err(MapscoutError::Aborted)));
    assert!(tiles.iter().all(|t| !t.is_complete()));
}

#[test]
fn test_closed_database_fails_loading() {
    let dir = TempDir::new().unwrap();
    build_database(dir.path(), false);

    let database = Arc::new(Database::open(dir.path(), &DatabaseConfig::default()).unwrap());
    let types = type_definition(&database);
    let service = MapService::new(Arc::clone(&database), MapServiceConfig::default()).unwrap();
    let tiles = service.lookup_tiles(&Magnification::from_level(10), &map_box());

    database.close();
    assert!(!database.is_open());
    let result = service.load_missing_tile_data(&AreaSearchParameter::new(), &types, &tiles);
    assert!(matches!(result, Err(MapscoutError::DatabaseClosed(_))));
}

fn record_events(job: &mut DBLoadJob) -> Arc<parking_lot::Mutex<Vec<JobEvent>>> {
    let events = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let recorded = Arc::clone(&events);
    job.set_listener(move |event| recorded.lock().push(event.clone()));
    events
}

#[test]
fn test_load_job_collects_tiles() {
    let _ = env_logger::builder().is_test(true).try_init();
    let dir = TempDir::new().unwrap();
    build_database(dir.path(), false);

    let instance =
        DBInstance::open(dir.path(), &DatabaseConfig::default(), MapServiceConfig::default())
            .unwrap();
    let types = type_definition(&instance.database);

    let mut job = DBLoadJob::new(Magnification::from_level(10), map_box(), 4, true, false);
    let events = record_events(&mut job);
    job.run(&[instance.clone()], &types);

    assert!(job.wait_finished(Duration::from_secs(5)));
    assert!(!job.is_closed());

    let loaded = &job.loaded_tiles()[dir.path()];
    assert_eq!(loaded.len(), 12);
    assert_eq!(loaded.len(), job.all_tiles()[dir.path()].len());
    assert!(loaded.values().all(|t| t.is_complete()));

    {
        let events = events.lock();
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], JobEvent::DatabaseLoaded { path, tiles }
            if path.as_path() == dir.path() && tiles.len() == 12));
        assert!(matches!(&events[1], JobEvent::Finished { loaded } if loaded.len() == 1));
    }

    let mut data = MapData::new();
    job.add_tile_data_to_map_data(&mut data);
    assert_map_data(&data);

    // A second job over the now cached tiles finishes right away.
    let mut again = DBLoadJob::new(Magnification::from_level(10), map_box(), 4, true, true);
    again.run(&[instance], &types);
    assert!(again.is_finished());
    assert!(again.is_closed());
}

#[test]
fn test_load_job_skips_databases_outside_the_box() {
    let dir = TempDir::new().unwrap();
    build_database(dir.path(), false);

    let instance =
        DBInstance::open(dir.path(), &DatabaseConfig::default(), MapServiceConfig::default())
            .unwrap();
    let types = type_definition(&instance.database);

    let elsewhere = GeoBox::from_bounds(-34.0, 151.0, -33.5, 151.5);
    let mut job = DBLoadJob::new(Magnification::from_level(10), elsewhere, 4, true, false);
    let events = record_events(&mut job);
    job.run(&[instance], &types);

    assert!(job.is_finished());
    assert!(job.databases().is_empty());
    let events = events.lock();
    assert_eq!(events.len(), 1);
    assert!(matches!(&events[0], JobEvent::Finished { loaded } if loaded.is_empty()));
}

#[test]
fn test_closed_job_ignores_late_tiles() {
    let dir = TempDir::new().unwrap();
    build_database(dir.path(), false);

    let instance =
        DBInstance::open(dir.path(), &DatabaseConfig::default(), MapServiceConfig::default())
            .unwrap();
    let types = type_definition(&instance.database);

    let mut job = DBLoadJob::new(Magnification::from_level(10), map_box(), 4, true, false);
    let events = record_events(&mut job);
    job.run(&[instance.clone()], &types);
    job.close();
    let seen_at_close = events.lock().len();
    assert!(job.breaker().is_aborted());

    // Make sure every tile is loaded, then drain what the service sent.
    let tiles = instance
        .map_service
        .lookup_tiles(&Magnification::from_level(10), &map_box());
    instance
        .map_service
        .load_missing_tile_data(&AreaSearchParameter::new(), &types, &tiles)
        .unwrap();
    job.process_events();

    assert_eq!(events.lock().len(), seen_at_close);
    assert!(job.databases().is_empty());
}
