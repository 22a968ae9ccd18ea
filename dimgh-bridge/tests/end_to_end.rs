use dimgh_bridge::{ADD_ON_COMMAND, Bridge};
use dimgh_config::BridgeConfig;
use dimgh_core::document::{Document, Element, ElementGuid, ElementKind};
use dimgh_core::geometry::Point2;
use dimgh_core::store::ElementStore;
use serde_json::{Value, json};

struct Harness {
    bridge: Bridge<Document>,
    store: Document,
}

impl Harness {
    fn new() -> Self {
        Self {
            bridge: Bridge::new(&BridgeConfig::default()),
            store: Document::new(),
        }
    }

    /// 以面板信封发送命令，返回 `result` 部分。
    fn palette(&mut self, command: &str, payload: Value) -> Value {
        let request = json!({ "command": command, "payload": payload });
        let reply = self.bridge.handle_str(&mut self.store, &request.to_string());
        reply["result"].clone()
    }

    /// 以宿主命令表信封发送命令，返回 `addOnCommandResponse` 部分。
    fn add_on(&mut self, command: &str, parameters: Value) -> Value {
        let request = json!({
            "command": ADD_ON_COMMAND,
            "parameters": {
                "addOnCommandId": {"commandNamespace": "DimensionGh", "commandName": command},
                "addOnCommandParameters": parameters,
            },
        });
        let reply = self.bridge.handle_value(&mut self.store, &request);
        assert_eq!(reply["succeeded"], true, "{reply}");
        reply["result"]["addOnCommandResponse"].clone()
    }

    fn guid(value: &Value) -> ElementGuid {
        value.as_str().expect("guid string").parse().expect("valid guid")
    }
}

#[test]
fn hotspot_dimension_round_trip_is_idempotent() {
    let mut h = Harness::new();

    let first = h.palette("CreateHotspot", json!({"x": 0.0, "y": 0.0, "rhinoPointGuid": "pt-1"}));
    assert_eq!(first["success"], true);
    let hotspot = first["hotspotGuid"].clone();

    let again = h.palette("CreateHotspot", json!({"x": 0.0, "y": 0.0, "rhinoPointGuid": "pt-1"}));
    assert_eq!(again["success"], true);
    assert_eq!(again["hotspotGuid"], hotspot);
    match h.store.get(Harness::guid(&hotspot)) {
        Some(Element::Hotspot(marker)) => assert_eq!(marker.position, Point2::new(0.0, 0.0)),
        other => panic!("unexpected element {other:?}"),
    }

    let request = json!({
        "point1": {"x": 0.0, "y": 0.0},
        "point2": {"x": 10.0, "y": 0.0},
        "hotspotGuid1": hotspot,
        "hotspotGuid2": hotspot,
    });
    let created = h.palette("CreateLinearDimension", request.clone());
    assert_eq!(created["success"], true);
    assert_eq!(created["distance"], 10.0);

    let repeated = h.palette("CreateLinearDimension", request);
    assert_eq!(repeated["dimensionGuid"], created["dimensionGuid"]);
    assert_eq!(h.store.count_of_kind(ElementKind::LinearDimension), 1);
}

#[test]
fn reversed_marker_pair_returns_same_dimension() {
    let mut h = Harness::new();
    let a = h.add_on("CreateHotspot", json!({"x": 0.0, "y": 0.0}))["hotspotGuid"].clone();
    let b = h.add_on("CreateHotspot", json!({"x": 0.0, "y": 5.0}))["hotspotGuid"].clone();

    let forward = h.add_on(
        "CreateLinearDimension",
        json!({
            "point1": {"x": 0.0, "y": 0.0},
            "point2": {"x": 0.0, "y": 5.0},
            "hotspotGuid1": a,
            "hotspotGuid2": b,
        }),
    );
    let backward = h.add_on(
        "CreateLinearDimension",
        json!({
            "point1": {"x": 0.0, "y": 5.0},
            "point2": {"x": 0.0, "y": 0.0},
            "hotspotGuid1": b,
            "hotspotGuid2": a,
        }),
    );
    assert_eq!(forward["dimensionGuid"], backward["dimensionGuid"]);
    assert_eq!(backward["created"], false);
    assert_eq!(h.store.count_of_kind(ElementKind::LinearDimension), 1);
}

#[test]
fn degenerate_dimension_mutates_nothing() {
    let mut h = Harness::new();
    let before = h.store.len();
    let reply = h.palette(
        "CreateLinearDimension",
        json!({"point1": {"x": 1.0, "y": 1.0}, "point2": {"x": 1.0, "y": 1.0000001}}),
    );
    assert_eq!(reply["success"], false);
    assert_eq!(reply["error"]["code"], -2);
    assert_eq!(reply["error"]["message"], "points too close");
    assert_eq!(h.store.len(), before);
    assert_eq!(h.store.transaction_names().count(), 0);
}

#[test]
fn externally_deleted_hotspot_is_recreated() {
    let mut h = Harness::new();
    let first = h.palette("CreateHotspot", json!({"x": 2.0, "y": 2.0, "rhinoPointGuid": "pt-9"}));
    let guid = Harness::guid(&first["hotspotGuid"]);

    h.store
        .undoable("External", |store| store.delete_element(guid))
        .expect("external delete");

    let second = h.palette("CreateHotspot", json!({"x": 2.0, "y": 2.0, "rhinoPointGuid": "pt-9"}));
    assert_eq!(second["success"], true);
    assert_eq!(second["created"], true);
    assert_ne!(second["hotspotGuid"], first["hotspotGuid"]);
    assert_eq!(h.bridge.session().markers().len(), 1);
}

#[test]
fn marker_reference_wins_over_element_reference() {
    let mut h = Harness::new();
    let line = h.store.add_line(Point2::new(0.0, 0.0), Point2::new(0.0, 8.0), "WALLS");
    let marker = h.palette("CreateHotspot", json!({"x": 0.0, "y": 0.0}));
    assert_eq!(marker["elementGuid"], line.to_string());
    let far = h.palette("CreateHotspot", json!({"x": 6.0, "y": 0.0}));

    let reply = h.palette(
        "CreateLinearDimension",
        json!({
            "point1": {"x": 0.0, "y": 0.0},
            "point2": {"x": 6.0, "y": 0.0},
            "hotspotGuid1": marker["hotspotGuid"],
            "elementGuid1": line.to_string(),
            "hotspotGuid2": far["hotspotGuid"],
        }),
    );
    let dimension = Harness::guid(&reply["dimensionGuid"]);
    let Some(Element::LinearDimension(dim)) = h.store.get(dimension) else {
        panic!("dimension missing");
    };
    let anchor = dim.witnesses[0].anchor.expect("anchored start");
    assert_eq!(anchor.kind, ElementKind::Hotspot);
    assert_eq!(anchor.element, Harness::guid(&marker["hotspotGuid"]));
}

#[test]
fn offset_moves_dimension_line() {
    let mut h = Harness::new();
    let reply = h.palette(
        "CreateLinearDimension",
        json!({"point1": {"x": 1.0, "y": 1.0}, "point2": {"x": 4.0, "y": 1.0}, "offset": 2.5}),
    );
    let dimension = Harness::guid(&reply["dimensionGuid"]);
    let Some(Element::LinearDimension(dim)) = h.store.get(dimension) else {
        panic!("dimension missing");
    };
    assert!((dim.reference.x() - 1.0).abs() < 1e-12);
    assert!((dim.reference.y() - 3.5).abs() < 1e-12);
}

#[test]
fn dimension_follows_moved_hotspot_and_is_listed() {
    let mut h = Harness::new();
    let a = h.palette("CreateHotspot", json!({"x": 0.0, "y": 0.0}))["hotspotGuid"].clone();
    let b = h.palette("CreateHotspot", json!({"x": 2.0, "y": 0.0}))["hotspotGuid"].clone();
    h.palette(
        "CreateLinearDimension",
        json!({
            "point1": {"x": 0.0, "y": 0.0},
            "point2": {"x": 2.0, "y": 0.0},
            "hotspotGuid1": a,
            "hotspotGuid2": b,
        }),
    );

    let moved = h.palette("UpdateHotspot", json!({"hotspotGuid": b, "x": 7.5, "y": 0.0}));
    assert_eq!(moved["success"], true);

    let listed = h.palette("GetDimensions", json!({"filterLayer": "Dimensions"}));
    let dimensions = listed["dimensions"].as_array().expect("dimensions array");
    assert_eq!(dimensions.len(), 1);
    assert_eq!(dimensions[0]["text"], "7.50");
    assert_eq!(dimensions[0]["points"][1]["x"], 7.5);
}

#[test]
fn delete_all_and_teardown_clean_up_session() {
    let mut h = Harness::new();
    for x in [0.0, 1.0, 2.0] {
        h.palette("CreateHotspot", json!({"x": x, "y": 0.0}));
    }
    let reply = h.palette("DeleteAllHotspots", json!({}));
    assert_eq!(reply["deletedCount"], 3);
    assert_eq!(h.store.count_of_kind(ElementKind::Hotspot), 0);

    h.palette("CreateHotspot", json!({"x": 5.0, "y": 5.0}));
    assert_eq!(h.bridge.teardown(&mut h.store), 1);
    assert!(h.bridge.session().markers().is_empty());
    assert!(h.bridge.session().links().is_empty());
    assert_eq!(h.store.count_of_kind(ElementKind::Hotspot), 0);
}

#[test]
fn command_failures_keep_palette_ok_false() {
    let mut h = Harness::new();
    let request = json!({"command": "UpdateHotspot", "payload": {"hotspotGuid": ElementGuid::new().to_string(), "x": 1.0, "y": 1.0}});
    let reply = h.bridge.handle_value(&mut h.store, &request);
    assert_eq!(reply["ok"], false);
    assert_eq!(reply["result"]["success"], false);
    assert_eq!(reply["result"]["error"]["code"], -5);
    assert_eq!(reply["error"], reply["result"]["error"]["message"]);
}
