//! End-to-end dataset pipeline tests against a stubbed FRED API:
//! build -> catalog -> plot-from-dataset, plus the failure scenarios the
//! builder must surface.

mod common;

use std::collections::HashMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use fredmcp::dataset::{BuildRequest, DatasetBuilder, DatasetCatalog, MergeStrategy};
use fredmcp::fred::{FredGateway, SeriesId};
use fredmcp::transform::Transform;
use fredmcp::{Config, Error, ToolContext};

use common::{
    monthly_observations_body, observations_body, series_meta_body, spawn_fred_stub, StubRoutes,
};

fn id(s: &str) -> SeriesId {
    SeriesId::new(s).unwrap()
}

fn test_config(data_root: &std::path::Path) -> Config {
    Config::new("test-key", data_root).unwrap()
}

async fn stub_gateway(config: &Config, routes: StubRoutes) -> FredGateway {
    let base = spawn_fred_stub(routes).await;
    FredGateway::new(config).unwrap().with_base_url(base)
}

fn two_series_routes() -> StubRoutes {
    StubRoutes::new()
        .add(
            "/series?series_id=UNRATE",
            200,
            series_meta_body("UNRATE", "Unemployment Rate", "Percent"),
        )
        .add(
            "/series?series_id=CPIAUCSL",
            200,
            series_meta_body("CPIAUCSL", "Consumer Price Index", "Index 1982-1984=100"),
        )
        .add(
            "/series/observations?series_id=UNRATE",
            200,
            monthly_observations_body(3.5, 0.1, 24),
        )
        .add(
            "/series/observations?series_id=CPIAUCSL",
            200,
            monthly_observations_body(250.0, 1.0, 24),
        )
}

#[tokio::test]
async fn build_then_catalog_then_plot() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let gateway = stub_gateway(&config, two_series_routes()).await;
    let builder = DatasetBuilder::new(gateway, dir.path(), 4);

    let request = BuildRequest {
        series_list: vec![id("UNRATE"), id("CPIAUCSL")],
        transformations: HashMap::from([("CPIAUCSL".to_string(), Transform::YoY)]),
        observation_start: None,
        observation_end: None,
        merge_strategy: MergeStrategy::Inner,
    };

    let summary = builder.build(&request, &CancellationToken::new()).await.unwrap();

    assert_eq!(summary.name, "FRED_dataset_UNRATE_CPIAUCSL");
    assert_eq!(summary.columns, vec!["UNRATE", "CPIAUCSL_YoY"]);
    assert_eq!(summary.row_count, 24);
    assert!(summary.errors.is_empty());
    assert!(summary.csv_path.exists());
    assert!(summary.xlsx_path.exists());
    assert!(summary.metadata_path.exists());

    // Catalog lists the new dataset first, with transformation suffixes.
    let catalog = DatasetCatalog::new(dir.path());
    let recent = catalog.recent(10).unwrap();
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0].name, summary.name);
    assert_eq!(recent[0].columns, vec!["UNRATE", "CPIAUCSL_YoY"]);
    assert_eq!(recent[0].row_count, 24);

    let listing = catalog.render_listing(10).unwrap();
    assert!(listing.contains("FRED_dataset_UNRATE_CPIAUCSL"));
    assert!(listing.contains("CPIAUCSL -> YoY"));

    // Cross-session: a fresh context (as a new process would build) resolves
    // the dataset via the catalog and plots without network access.
    let fresh = ToolContext::new(test_config(dir.path())).unwrap();
    let outcome = fresh
        .plots
        .plot_from_dataset("UNRATE", "CPIAUCSL_YoY", None, None, None)
        .await
        .unwrap();
    assert!(outcome.plot_path.exists());
    assert!(outcome
        .plot_path
        .starts_with(summary.csv_path.parent().unwrap()));
    assert_eq!(outcome.dataset_path, summary.csv_path);
}

#[tokio::test]
async fn unknown_column_lists_available() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let gateway = stub_gateway(&config, two_series_routes()).await;
    let builder = DatasetBuilder::new(gateway, dir.path(), 4);

    let request = BuildRequest {
        series_list: vec![id("UNRATE"), id("CPIAUCSL")],
        transformations: HashMap::from([("CPIAUCSL".to_string(), Transform::YoY)]),
        observation_start: None,
        observation_end: None,
        merge_strategy: MergeStrategy::Inner,
    };
    builder.build(&request, &CancellationToken::new()).await.unwrap();

    let context = ToolContext::new(test_config(dir.path())).unwrap();
    let err = context
        .plots
        .plot_from_dataset("UNRATE", "CPIAUCSL_XYZ", None, None, None)
        .await
        .unwrap_err();

    // Resolution happens by column membership, so a bogus column can never
    // match a dataset.
    assert!(matches!(err, Error::NotFound(_)));

    // With an explicit dataset path the column check itself fires.
    let catalog = DatasetCatalog::new(dir.path());
    let newest = catalog.most_recent().unwrap().unwrap();
    let err = context
        .plots
        .plot_from_dataset(
            "UNRATE",
            "CPIAUCSL_XYZ",
            Some(&newest.csv_path),
            None,
            None,
        )
        .await
        .unwrap_err();
    assert_eq!(err.code().as_i32(), -32016);
    assert!(err.to_string().contains("CPIAUCSL_YoY"), "err: {err}");
}

#[tokio::test]
async fn partial_failure_reports_per_series_errors() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let routes = StubRoutes::new()
        .add(
            "/series?series_id=GDP",
            200,
            series_meta_body("GDP", "Gross Domestic Product", "Billions of Dollars"),
        )
        .add(
            "/series/observations?series_id=GDP",
            200,
            monthly_observations_body(20000.0, 100.0, 24),
        )
        .add(
            "/series?series_id=XXXXX",
            400,
            serde_json::json!({
                "error_code": 400,
                "error_message": "Bad Request. The series does not exist."
            }),
        );
    let gateway = stub_gateway(&config, routes).await;
    let builder = DatasetBuilder::new(gateway, dir.path(), 4);

    let request = BuildRequest {
        series_list: vec![id("GDP"), id("XXXXX")],
        transformations: HashMap::new(),
        observation_start: None,
        observation_end: None,
        merge_strategy: MergeStrategy::Inner,
    };

    let summary = builder.build(&request, &CancellationToken::new()).await.unwrap();
    assert_eq!(summary.name, "FRED_dataset_GDP");
    assert_eq!(summary.columns, vec!["GDP"]);
    assert_eq!(summary.errors.len(), 1);
    assert!(summary.errors["XXXXX"].contains("does not exist"));
}

#[tokio::test]
async fn all_series_failing_fails_the_build() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let routes = StubRoutes::new().add(
        "/series?series_id=XXXXX",
        400,
        serde_json::json!({
            "error_code": 400,
            "error_message": "Bad Request. The series does not exist."
        }),
    );
    let gateway = stub_gateway(&config, routes).await;
    let builder = DatasetBuilder::new(gateway, dir.path(), 4);

    let request = BuildRequest {
        series_list: vec![id("XXXXX")],
        transformations: HashMap::new(),
        observation_start: None,
        observation_end: None,
        merge_strategy: MergeStrategy::Inner,
    };

    let err = builder
        .build(&request, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("XXXXX"));
    assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
}

#[tokio::test]
async fn disjoint_windows_are_an_empty_intersection() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let routes = StubRoutes::new()
        .add(
            "/series?series_id=OLD",
            200,
            series_meta_body("OLD", "Old Series", "Units"),
        )
        .add(
            "/series?series_id=NEW",
            200,
            series_meta_body("NEW", "New Series", "Units"),
        )
        .add(
            "/series/observations?series_id=OLD",
            200,
            observations_body(&[
                ("2000-01-01", Some(1.0)),
                ("2000-02-01", Some(2.0)),
            ]),
        )
        .add(
            "/series/observations?series_id=NEW",
            200,
            observations_body(&[
                ("2020-01-01", Some(10.0)),
                ("2020-02-01", Some(20.0)),
            ]),
        );
    let gateway = stub_gateway(&config, routes).await;
    let builder = DatasetBuilder::new(gateway, dir.path(), 4);

    let request = BuildRequest {
        series_list: vec![id("OLD"), id("NEW")],
        transformations: HashMap::new(),
        observation_start: None,
        observation_end: None,
        merge_strategy: MergeStrategy::Inner,
    };

    let err = builder
        .build(&request, &CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(err.code().as_i32(), -32014);
    let message = err.to_string();
    assert!(message.contains("OLD covers 2000-01-01 to 2000-02-01"), "{message}");
    assert!(message.contains("NEW covers 2020-01-01 to 2020-02-01"), "{message}");

    // No partial dataset folder may remain.
    assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
}

#[tokio::test]
async fn cancelled_build_leaves_no_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let gateway = stub_gateway(&config, two_series_routes()).await;
    let builder = DatasetBuilder::new(gateway, dir.path(), 4);

    let request = BuildRequest {
        series_list: vec![id("UNRATE"), id("CPIAUCSL")],
        transformations: HashMap::new(),
        observation_start: None,
        observation_end: None,
        merge_strategy: MergeStrategy::Inner,
    };

    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = builder.build(&request, &cancel).await.unwrap_err();
    assert!(matches!(err, Error::Cancelled));
    assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());

    // The catalog must not list anything either.
    assert!(DatasetCatalog::new(dir.path()).scan().unwrap().is_empty());
}

#[tokio::test]
async fn rebuilding_is_idempotent_modulo_created_at() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let gateway = stub_gateway(&config, two_series_routes()).await;
    let builder = DatasetBuilder::new(gateway, dir.path(), 4);

    let request = BuildRequest {
        series_list: vec![id("UNRATE"), id("CPIAUCSL")],
        transformations: HashMap::from([("CPIAUCSL".to_string(), Transform::YoY)]),
        observation_start: None,
        observation_end: None,
        merge_strategy: MergeStrategy::Inner,
    };

    let first = builder.build(&request, &CancellationToken::new()).await.unwrap();
    let first_csv = std::fs::read(&first.csv_path).unwrap();

    let second = builder.build(&request, &CancellationToken::new()).await.unwrap();
    let second_csv = std::fs::read(&second.csv_path).unwrap();

    assert_eq!(first.csv_path, second.csv_path);
    assert_eq!(first_csv, second_csv);
}

#[tokio::test]
async fn outer_merge_keeps_union_with_nulls() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let routes = StubRoutes::new()
        .add("/series?series_id=A", 200, series_meta_body("A", "A", "u"))
        .add("/series?series_id=B", 200, series_meta_body("B", "B", "u"))
        .add(
            "/series/observations?series_id=A",
            200,
            observations_body(&[("2020-01-01", Some(1.0)), ("2020-02-01", Some(2.0))]),
        )
        .add(
            "/series/observations?series_id=B",
            200,
            observations_body(&[("2020-02-01", Some(20.0)), ("2020-03-01", Some(30.0))]),
        );
    let gateway = stub_gateway(&config, routes).await;
    let builder = DatasetBuilder::new(gateway, dir.path(), 4);

    let request = BuildRequest {
        series_list: vec![id("A"), id("B")],
        transformations: HashMap::new(),
        observation_start: None,
        observation_end: None,
        merge_strategy: MergeStrategy::Outer,
    };

    let summary = builder.build(&request, &CancellationToken::new()).await.unwrap();
    assert_eq!(summary.row_count, 3);

    let table = fredmcp::dataset::DataTable::read_csv(&summary.csv_path).unwrap();
    assert_eq!(table.column("A").unwrap().values, vec![Some(1.0), Some(2.0), None]);
    assert_eq!(table.column("B").unwrap().values, vec![None, Some(20.0), Some(30.0)]);
}

#[tokio::test]
async fn gateway_survives_transient_rate_limit() {
    // A 429 on every attempt exhausts the retry budget and surfaces as
    // rate_limited; the drop below proves classification, the timing-free
    // path proves the retry loop terminates.
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    config = config.with_retry_attempts(2);
    let routes = StubRoutes::new().add(
        "/series?series_id=BUSY",
        429,
        serde_json::json!({"error_code": 429, "error_message": "Too Many Requests"}),
    );
    let gateway = stub_gateway(&config, routes).await;

    let err = gateway.series_meta(&id("BUSY")).await.unwrap_err();
    assert_eq!(err.code().as_i32(), -32013);
}

#[tokio::test]
async fn worker_context_wires_fifteen_tools() {
    let dir = tempfile::tempdir().unwrap();
    let context = Arc::new(ToolContext::new(test_config(dir.path())).unwrap());
    let registry = fredmcp::ToolRegistry::new(context);
    assert_eq!(registry.len(), 15);

    for name in [
        "fetch_series_metadata_tool",
        "fetch_series_observations_tool",
        "search_fred_series_tool",
        "fetch_fred_releases_tool",
        "fetch_release_details_tool",
        "fetch_category_details_tool",
        "fetch_fred_sources_tool",
        "build_fred_dataset_tool",
        "find_dataset_tool",
        "plot_fred_series_tool",
        "plot_dual_axis_tool",
        "analyze_differencing_tool",
        "plot_from_dataset_tool",
        "get_economic_indicator",
        "compare_economies",
    ] {
        assert!(registry.get(name).is_some(), "missing tool {name}");
    }
}
