mod common;

use common::{form_fields, wait_for, MockCatalog, CRATE_GLTF};
use glam::Vec3;
use parking_lot::Mutex;
use scene_mirror::{
    headless::Node, spawn_push_worker, Aabb, CatalogClient, CatalogError, CommandIngressServer,
    DecomposedTransform, Direction, EditLoop, HeadlessScene, ImportError, IngressContext,
    LocalEdit, NodeId, PushQueue, SceneBackend,
};
use serde_json::{json, Value};
use std::{path::Path, sync::Arc, time::Duration};

fn model(id: &str, model_path: &str, x: f32, hidden: bool) -> Value {
    json!({
        "id": id,
        "name": id,
        "description": format!("{id} from the catalog"),
        "lastUpdated": "2024-05-01T12:00:00Z",
        "modelPath": model_path,
        "transform": [[1, 0, 0, x], [0, 1, 0, 0], [0, 0, 1, 0], [0, 0, 0, 1]],
        "hidden": hidden
    })
}

fn client(catalog: &MockCatalog) -> Arc<CatalogClient> {
    Arc::new(CatalogClient::new(catalog.url(), "scene-1"))
}

fn headless_loop(client: Arc<CatalogClient>) -> EditLoop<HeadlessScene> {
    let (pushes, _receiver) = PushQueue::bounded(4);
    EditLoop::new(HeadlessScene::new(), client, IngressContext::new(), pushes, 0.5)
}

fn first_child(scene: &HeadlessScene, id: NodeId) -> NodeId {
    scene.node(id).map(|node: &Node| node.children[0]).unwrap()
}

#[tokio::test]
async fn refresh_mirrors_visible_models() {
    let catalog = MockCatalog::start();
    catalog.add_asset("crate.gltf", CRATE_GLTF.as_bytes());
    catalog.set_listing(json!([
        model("a", &catalog.asset_url("crate.gltf"), 2.0, false),
        model("shy", &catalog.asset_url("crate.gltf"), 0.0, true),
        model("broken", &catalog.asset_url("missing.gltf"), 0.0, false),
    ]));

    let downloads = tempfile::tempdir().unwrap();
    let client = Arc::new(
        CatalogClient::new(catalog.url(), "scene-1")
            .with_download_dir(Some(downloads.path().to_path_buf())),
    );
    let mut edit_loop = headless_loop(client);

    let summary = edit_loop.refresh().await.unwrap();
    assert_eq!(summary.listed, 3);
    assert_eq!(summary.visible, 2);
    assert_eq!(summary.resolved, 1);
    assert_eq!(summary.replaced.unwrap().skipped, 1);

    assert_eq!(edit_loop.mirror().ids().collect::<Vec<_>>(), vec!["a"]);
    assert_eq!(edit_loop.selected(), Some("a"));

    let entry = edit_loop.mirror().get("a").unwrap();
    let node = edit_loop.backend().node(entry.handle).unwrap();
    assert_eq!(node.transform.position, Vec3::new(2.0, 0.0, 0.0));
    assert_eq!(node.collider, Some(Aabb::unit()));

    assert_eq!(
        catalog.state.lock().list_queries,
        vec!["scene_id=scene-1".to_string()]
    );
    assert_eq!(std::fs::read_dir(downloads.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn second_refresh_replaces_everything() {
    let catalog = MockCatalog::start();
    catalog.add_asset("crate.gltf", CRATE_GLTF.as_bytes());
    let asset = catalog.asset_url("crate.gltf");
    catalog.set_listing(json!([model("a", &asset, 0.0, false), model("b", &asset, 1.0, false)]));

    let mut edit_loop = headless_loop(client(&catalog));
    edit_loop.refresh().await.unwrap();
    let old_roots = edit_loop.backend().roots();
    assert_eq!(old_roots.len(), 2);

    catalog.set_listing(json!([model("c", &asset, 0.0, false), model("d", &asset, 1.0, false)]));
    let summary = edit_loop.refresh().await.unwrap();
    assert_eq!(summary.replaced.unwrap().released, 2);

    assert_eq!(edit_loop.mirror().ids().collect::<Vec<_>>(), vec!["c", "d"]);
    assert_eq!(edit_loop.selected(), Some("c"));
    assert_eq!(edit_loop.backend().roots().len(), 2);
    for root in old_roots {
        assert!(edit_loop.backend().node(root).is_none());
    }

    // root -> glTF "crate" -> "lid"
    let d_root = edit_loop.mirror().get("d").unwrap().handle;
    let lid = first_child(edit_loop.backend(), first_child(edit_loop.backend(), d_root));
    assert_eq!(edit_loop.backend().node(lid).unwrap().name, "lid");
    assert_eq!(edit_loop.select_handle(lid), Some("d"));
}

#[tokio::test]
async fn failed_or_empty_listing_keeps_the_scene() {
    let catalog = MockCatalog::start();
    catalog.add_asset("crate.gltf", CRATE_GLTF.as_bytes());
    catalog.set_listing(json!([model("a", &catalog.asset_url("crate.gltf"), 0.0, false)]));

    let mut edit_loop = headless_loop(client(&catalog));
    edit_loop.refresh().await.unwrap();

    catalog.state.lock().list_status = 500;
    assert!(matches!(
        edit_loop.refresh().await,
        Err(CatalogError::FetchFailed(_))
    ));
    assert_eq!(edit_loop.mirror().ids().collect::<Vec<_>>(), vec!["a"]);

    catalog.state.lock().list_status = 200;
    catalog.set_listing(json!([model("gone", "", 0.0, true)]));
    let summary = edit_loop.refresh().await.unwrap();
    assert_eq!(summary.visible, 0);
    assert_eq!(summary.replaced, None);
    assert_eq!(edit_loop.mirror().ids().collect::<Vec<_>>(), vec!["a"]);
    assert_eq!(edit_loop.backend().roots().len(), 1);
}

#[tokio::test]
async fn edits_are_pushed_row_major() {
    let catalog = MockCatalog::start();
    catalog.add_asset("crate.gltf", CRATE_GLTF.as_bytes());
    catalog.set_listing(json!([model("a", &catalog.asset_url("crate.gltf"), 2.0, false)]));

    let client = client(&catalog);
    let (pushes, _worker) = spawn_push_worker(client.clone(), 4);
    let stats = pushes.stats();
    let mut edit_loop =
        EditLoop::new(HeadlessScene::new(), client, IngressContext::new(), pushes, 0.5);
    edit_loop.refresh().await.unwrap();

    edit_loop.queue_edit(LocalEdit::Translate(Direction::Right));
    let report = edit_loop.tick().await;
    assert_eq!(report.edited.as_deref(), Some("a"));
    assert!(report.pushed);

    assert!(wait_for(Duration::from_secs(5), || catalog.pushes().len() == 1).await);
    let (path, body) = catalog.pushes().remove(0);
    assert_eq!(path, "/api/models/a/transform");

    let fields = form_fields(&body);
    assert_eq!(fields["scene_id"], "scene-1");
    let matrix: [[f32; 4]; 4] = serde_json::from_str(&fields["transform"]).unwrap();
    assert_eq!(matrix[0][3], 2.5);
    assert_eq!(matrix[3], [0.0, 0.0, 0.0, 1.0]);

    assert!(wait_for(Duration::from_secs(5), || stats.snapshot().succeeded == 1).await);
}

/// Headless scene that records structural changes in a shared log.
struct RecordingScene {
    inner: HeadlessScene,
    events: Arc<Mutex<Vec<String>>>,
}

impl SceneBackend for RecordingScene {
    type Handle = NodeId;

    fn instantiate(&mut self, path: &Path, name: &str) -> Result<NodeId, ImportError> {
        self.events.lock().push(format!("instantiate {name}"));
        self.inner.instantiate(path, name)
    }

    fn destroy(&mut self, handle: NodeId) {
        self.events.lock().push("destroy".to_string());
        self.inner.destroy(handle);
    }

    fn parent(&self, handle: NodeId) -> Option<NodeId> {
        self.inner.parent(handle)
    }

    fn set_transform(&mut self, handle: NodeId, transform: &DecomposedTransform) {
        self.inner.set_transform(handle, transform);
    }

    fn render_bounds(&self, handle: NodeId) -> Option<Aabb> {
        self.inner.render_bounds(handle)
    }

    fn has_collider(&self, handle: NodeId) -> bool {
        self.inner.has_collider(handle)
    }

    fn attach_collider(&mut self, handle: NodeId, collider: Aabb) {
        self.inner.attach_collider(handle, collider);
    }
}

#[tokio::test]
async fn notified_refreshes_run_one_after_another() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let catalog = MockCatalog::start();
    catalog.add_asset("crate.gltf", CRATE_GLTF.as_bytes());
    catalog.set_listing(json!([model("a", &catalog.asset_url("crate.gltf"), 0.0, false)]));
    {
        let mut state = catalog.state.lock();
        state.list_delay = Duration::from_millis(200);
        state.events = Some(events.clone());
    }

    let context = IngressContext::new();
    let mut server = CommandIngressServer::new("127.0.0.1:0", context.clone(), 2);
    let addr = server.start().unwrap();
    let notify = format!("http://{addr}/notify");
    let http = reqwest::Client::new();
    for _ in 0..2 {
        let response = http.post(&notify).send().await.unwrap();
        assert!(response.status().is_success());
    }

    let (pushes, _receiver) = PushQueue::bounded(4);
    let backend = RecordingScene {
        inner: HeadlessScene::new(),
        events: events.clone(),
    };
    let mut edit_loop = EditLoop::new(backend, client(&catalog), context, pushes, 0.5);

    // A third notification lands while the first refresh is still fetching.
    let (first, late) = tokio::join!(edit_loop.tick(), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        http.post(&notify).send().await.unwrap().status()
    });
    assert!(late.is_success());
    assert_eq!(first.refreshes, 2);
    assert_eq!(first.refresh_failures, 0);

    let second = edit_loop.tick().await;
    assert_eq!(second.refreshes, 1);

    // New models load before the old ones are destroyed; every later fetch
    // starts only after the previous replace has finished.
    assert_eq!(
        *events.lock(),
        vec![
            "fetch",
            "instantiate a",
            "fetch",
            "instantiate a",
            "destroy",
            "fetch",
            "instantiate a",
            "destroy",
        ]
    );
    assert_eq!(edit_loop.mirror().len(), 1);
    server.stop();
}
