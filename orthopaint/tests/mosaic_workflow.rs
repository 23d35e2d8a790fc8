//! End-to-end workflow through the public API: WMTS discovery, tile
//! fetching through the cache, mosaic assembly, and the GDAL/PDAL command
//! sequence, with the network and external tools replaced by fakes.

use std::ffi::OsString;
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use image::{Rgb, RgbImage};
use tempfile::TempDir;

use orthopaint::cache::TileCache;
use orthopaint::coord::GroundCell;
use orthopaint::crs::{BuiltinTransform, CrsId, CrsTransform};
use orthopaint::mosaic::MosaicAssembler;
use orthopaint::orchestrator::{CellError, Orchestrator, OrchestratorSettings, ToolRunner};
use orthopaint::provider::{
    FetchSettings, HttpClient, ProviderConfig, ProviderError, ProviderFactory, WmtsConfig,
};

const CAPABILITIES: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Capabilities xmlns="http://www.opengis.net/wmts/1.0" xmlns:ows="http://www.opengis.net/ows/1.1" version="1.0.0">
  <Contents>
    <Layer>
      <ows:Identifier>ORTHOIMAGERY.ORTHOPHOTOS</ows:Identifier>
      <Style isDefault="true"><ows:Identifier>normal</ows:Identifier></Style>
      <Format>image/jpeg</Format>
      <TileMatrixSetLink><TileMatrixSet>PM</TileMatrixSet></TileMatrixSetLink>
    </Layer>
    <TileMatrixSet>
      <ows:Identifier>PM</ows:Identifier>
      <ows:SupportedCRS>EPSG:3857</ows:SupportedCRS>
      <TileMatrix>
        <ows:Identifier>18</ows:Identifier>
        <ScaleDenominator>2132.7295269166</ScaleDenominator>
        <TopLeftCorner>-20037508.3427892476 20037508.3427892476</TopLeftCorner>
        <TileWidth>256</TileWidth>
        <TileHeight>256</TileHeight>
        <MatrixWidth>262144</MatrixWidth>
        <MatrixHeight>262144</MatrixHeight>
      </TileMatrix>
    </TileMatrixSet>
  </Contents>
</Capabilities>"#;

/// Fake WMTS server. Every `fail_every`-th tile request fails.
struct FakeWmts {
    tile: Vec<u8>,
    fail_every: Option<usize>,
    tiles_served: AtomicUsize,
    requests: Mutex<Vec<String>>,
}

impl FakeWmts {
    fn new(fail_every: Option<usize>) -> Self {
        let img = RgbImage::from_pixel(256, 256, Rgb([40, 120, 60]));
        let mut tile = Vec::new();
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut tile), image::ImageFormat::Png)
            .unwrap();
        Self {
            tile,
            fail_every,
            tiles_served: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    fn tile_requests(&self) -> usize {
        self.requests()
            .iter()
            .filter(|u| u.contains("REQUEST=GetTile"))
            .count()
    }
}

impl HttpClient for FakeWmts {
    fn get(&self, url: &str) -> Result<Vec<u8>, ProviderError> {
        self.requests.lock().unwrap().push(url.to_string());
        if url.contains("REQUEST=GetCapabilities") {
            return Ok(CAPABILITIES.as_bytes().to_vec());
        }
        let n = self.tiles_served.fetch_add(1, Ordering::SeqCst);
        match self.fail_every {
            Some(every) if n % every == every - 1 => Err(ProviderError::HttpStatus {
                status: 503,
                url: url.to_string(),
            }),
            _ => Ok(self.tile.clone()),
        }
    }
}

/// Records tool invocations and writes the files GDAL would produce.
#[derive(Default)]
struct RecordingTools {
    calls: Mutex<Vec<(String, Vec<String>)>>,
}

impl RecordingTools {
    fn calls(&self) -> Vec<(String, Vec<String>)> {
        self.calls.lock().unwrap().clone()
    }
}

impl ToolRunner for RecordingTools {
    fn run(&self, program: &Path, args: &[OsString]) -> Result<(), CellError> {
        let tool = program.display().to_string();
        let args: Vec<String> = args.iter().map(|a| a.to_string_lossy().into_owned()).collect();
        if tool != "pdal" {
            if let Some(out) = args.last() {
                fs::write(out, b"II*\0").unwrap();
            }
        }
        self.calls.lock().unwrap().push((tool, args));
        Ok(())
    }
}

fn ign_config() -> ProviderConfig {
    ProviderConfig::Wmts(WmtsConfig {
        url: "https://wmts.test/wmts".to_string(),
        layer: "ORTHOIMAGERY.ORTHOPHOTOS".to_string(),
        style: None,
        matrix_set: "PM".to_string(),
        zoom: 18,
        format: None,
    })
}

fn factory(client: Arc<FakeWmts>, cache_dir: &Path) -> ProviderFactory {
    ProviderFactory::new(
        client,
        Arc::new(TileCache::new(cache_dir)),
        Arc::new(BuiltinTransform::new()),
        FetchSettings {
            request_delay: Duration::ZERO,
            ..FetchSettings::default()
        },
    )
}

fn settings(work_dir: &Path, keep: bool) -> OrchestratorSettings {
    OrchestratorSettings {
        work_dir: work_dir.to_path_buf(),
        keep_temp_files: keep,
        zoom: Some(18),
        workers: 2,
        ..OrchestratorSettings::default()
    }
}

#[test]
fn test_mosaic_covers_cell_with_margin() {
    let temp = TempDir::new().unwrap();
    let client = Arc::new(FakeWmts::new(None));
    let handler = factory(client.clone(), temp.path()).create(&ign_config());
    handler.discover().unwrap();

    let cell = GroundCell::new(650, 6860);
    let mosaic = MosaicAssembler::new(handler).assemble(&cell, 70.0).unwrap();

    assert_eq!(mosaic.crs, CrsId::web_mercator());
    assert!(mosaic.is_complete());
    assert_eq!(mosaic.image.width() % 256, 0);
    assert_eq!(mosaic.image.height() % 256, 0);
    assert_eq!(
        client.tile_requests() as u32,
        (mosaic.image.width() / 256) * (mosaic.image.height() / 256)
    );

    let transform = BuiltinTransform::new();
    let cell_bounds = cell.bounds(70.0).unwrap();
    assert!((cell_bounds.width() - 1140.0).abs() < 1e-9);
    for (x, y) in cell_bounds.perimeter_points(4) {
        let (mx, my) = transform
            .transform(&CrsId::lambert93(), &CrsId::web_mercator(), x, y)
            .unwrap();
        assert!(mosaic.bounds.contains_point(mx, my));
    }
}

#[test]
fn test_colorize_run_with_cache_reuse() {
    let temp = TempDir::new().unwrap();
    let cache_dir = temp.path().join("cache");
    let work_dir = temp.path().join("work");
    let inputs = vec![
        PathBuf::from("/lidar/LHD_FXX_2021_0650_6860_LA93_IGN69.copc.laz"),
        PathBuf::from("/lidar/LHD_FXX_2021_0651_6860_LA93_IGN69.copc.laz"),
        PathBuf::from("/lidar/metadata.xml"),
    ];

    let client = Arc::new(FakeWmts::new(None));
    let tools = Arc::new(RecordingTools::default());
    let orchestrator = Orchestrator::new(
        factory(client.clone(), &cache_dir).create(&ign_config()),
        tools.clone(),
        settings(&work_dir, true),
    );

    let summary = orchestrator.run(&inputs).unwrap();
    assert!(summary.is_success());
    assert_eq!(summary.processed.len(), 2);
    assert_eq!(summary.skipped, vec![PathBuf::from("/lidar/metadata.xml")]);
    assert_eq!(summary.placeholders(), 0);

    let calls = tools.calls();
    assert_eq!(calls.len(), 6);
    for (tool, args) in calls.iter().filter(|(t, _)| t == "gdal_translate") {
        assert_eq!(tool, "gdal_translate");
        assert_eq!(args[5], "EPSG:3857");
        let ullr: Vec<f64> = args[7..11].iter().map(|v| v.parse().unwrap()).collect();
        assert!(ullr[0] < ullr[2], "ulx < lrx");
        assert!(ullr[1] > ullr[3], "uly > lry");
        assert!(args[7].split('.').nth(1).map(str::len) == Some(6));
    }
    for (_, args) in calls.iter().filter(|(t, _)| t == "gdalwarp") {
        assert_eq!(args[..2], ["-t_srs", "EPSG:2154"]);
    }

    let pipeline: serde_json::Value = serde_json::from_str(
        &fs::read_to_string(work_dir.join("pdal-0650_6860.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(
        pipeline["pipeline"][0],
        "/lidar/LHD_FXX_2021_0650_6860_LA93_IGN69.copc.laz"
    );
    assert!(pipeline["pipeline"][1]["raster"]
        .as_str()
        .unwrap()
        .ends_with("img-18-0650-6860.tiff"));
    assert!(pipeline["pipeline"][2]["filename"]
        .as_str()
        .unwrap()
        .ends_with("color-0650_6860.laz"));

    // A second run over the same cache only fetches capabilities
    let tiles_first_run = client.tile_requests();
    let second_client = Arc::new(FakeWmts::new(None));
    let orchestrator = Orchestrator::new(
        factory(second_client.clone(), &cache_dir).create(&ign_config()),
        Arc::new(RecordingTools::default()),
        settings(&temp.path().join("work2"), false),
    );
    orchestrator.run(&inputs[..1]).unwrap();

    assert!(tiles_first_run > 0);
    assert_eq!(second_client.tile_requests(), 0);
    assert_eq!(second_client.requests().len(), 1);
}

#[test]
fn test_failed_tiles_become_placeholders() {
    let temp = TempDir::new().unwrap();
    let client = Arc::new(FakeWmts::new(Some(7)));
    let tools = Arc::new(RecordingTools::default());
    let orchestrator = Orchestrator::new(
        factory(client, &temp.path().join("cache")).create(&ign_config()),
        tools.clone(),
        settings(&temp.path().join("work"), false),
    );

    let summary = orchestrator
        .run(&[PathBuf::from("Semis_2021_0650_6860_LA93_IGN69.laz")])
        .unwrap();

    assert!(summary.is_success());
    assert!(summary.placeholders() > 0);
    assert_eq!(tools.calls().len(), 3);
}
