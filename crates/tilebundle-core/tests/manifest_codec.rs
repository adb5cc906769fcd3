use std::sync::Arc;
use std::time::SystemTime;

use tilebundle_core::config::MetadataFormat;
use tilebundle_core::error::BundleError;
use tilebundle_core::metadata::{decode_manifest, encode_manifest, from_binary, to_binary};
use tilebundle_core::model::{
    BundleManifest, BundleTileSet, CellLayout, ObjectMetrics, Rect, RowSpec, Spot, Sprite,
    TileSet, TileSetKind, TrimmedSprite, TrimmedTileSet,
};

fn sample() -> BundleManifest {
    let mut m = BundleManifest::new(SystemTime::now());
    m.insert(
        2,
        BundleTileSet::Source(TileSet {
            name: Some("grass".into()),
            image_path: "grass.raw".into(),
            layout: CellLayout::Uniform { width: 64, height: 48 },
            kind: TileSetKind::Plain,
            colorizations: None,
        }),
    );
    m.insert(
        5,
        BundleTileSet::Source(TileSet {
            name: Some("signs".into()),
            image_path: "signs.png".into(),
            layout: CellLayout::Rows {
                rows: vec![
                    RowSpec { count: 3, width: 32, height: 32 },
                    RowSpec { count: 1, width: 64, height: 40 },
                ],
                offset: (1, 1),
                gap: (2, 2),
            },
            kind: TileSetKind::Object {
                sprites: vec![Sprite {
                    owidth: 1,
                    oheight: 1,
                    xorigin: 16,
                    yorigin: 30,
                    priority: None,
                    spot: None,
                    constraints: None,
                }],
            },
            colorizations: None,
        }),
    );
    m.insert(
        9,
        BundleTileSet::Trimmed(TrimmedTileSet {
            name: "chairs".into(),
            image_path: "chairs.raw".into(),
            sprites: vec![
                TrimmedSprite {
                    bounds: Rect::new(0, 0, 14, 20),
                    metrics: ObjectMetrics { x: -4, y: 17, width: 1, height: 1 },
                    priority: Some(-2),
                    spot: Some(Spot { x: 3, y: -8, orient: 2 }),
                    constraints: Some(vec!["chair".into(), "facing_left".into()]),
                },
                TrimmedSprite {
                    bounds: Rect::default(),
                    metrics: ObjectMetrics { x: 0, y: 0, width: 2, height: 1 },
                    priority: None,
                    spot: None,
                    constraints: None,
                },
            ],
            colorizations: Some(Arc::from(vec!["wood".to_string(), "cloth".to_string()])),
        }),
    );
    m
}

fn assert_same(a: &BundleManifest, b: &BundleManifest) {
    assert_eq!(a.ids().collect::<Vec<_>>(), b.ids().collect::<Vec<_>>());
    for (id, set) in a.iter() {
        assert_eq!(Some(set), b.get(id), "tile set {id}");
    }
}

#[test]
fn binary_manifest_reads_back() {
    let m = sample();
    let bytes = encode_manifest(&m, MetadataFormat::Binary).unwrap();
    assert_eq!(&bytes[0..4], b"TSBD");
    assert_same(&m, &decode_manifest(&bytes, MetadataFormat::Binary).unwrap());
}

#[test]
fn json_manifest_reads_back() {
    let m = sample();
    let bytes = encode_manifest(&m, MetadataFormat::Json).unwrap();
    assert_same(&m, &decode_manifest(&bytes, MetadataFormat::Json).unwrap());
}

#[test]
fn json_manifest_shape() {
    let bytes = encode_manifest(&sample(), MetadataFormat::Json).unwrap();
    let v: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    let entries = v.as_array().unwrap();
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[0]["id"], 2);
    assert_eq!(entries[0]["set"]["source"]["kind"], "plain");
    assert_eq!(entries[0]["set"]["source"]["layout"]["type"], "uniform");
    let chairs = &entries[2]["set"]["trimmed"];
    assert_eq!(chairs["name"], "chairs");
    assert_eq!(chairs["sprites"][0]["metrics"]["x"], -4);
    assert!(chairs["sprites"][1].get("spot").is_none());
}

#[test]
fn trimmed_accessors_survive_binary() {
    let bytes = to_binary(&sample()).unwrap();
    let back = from_binary(&bytes).unwrap();
    let chairs = back.get(9).and_then(BundleTileSet::as_trimmed).unwrap();
    assert_eq!(chairs.spot_orient(0), 2);
    assert_eq!(chairs.spot_orient(1), -1);
    assert_eq!(chairs.priority(0), -2);
    assert_eq!(chairs.priority(1), 0);
    assert!(chairs.has_constraint(0, "facing_left"));
    assert_eq!(chairs.colorizations().map(<[String]>::len), Some(2));
    assert_eq!(back.find_by_name("signs").map(|(id, _)| id), Some(5));
}

#[test]
fn corrupt_binary_is_rejected() {
    let bytes = to_binary(&sample()).unwrap();

    let mut bad_magic = bytes.clone();
    bad_magic[0] = b'X';
    assert!(matches!(from_binary(&bad_magic), Err(BundleError::Metadata(_))));

    let mut trailing = bytes.clone();
    trailing.push(0);
    assert!(matches!(from_binary(&trailing), Err(BundleError::Metadata(_))));

    assert!(from_binary(&bytes[..bytes.len() - 3]).is_err());

    // entry count far larger than the input
    let mut huge = bytes[..6].to_vec();
    huge.extend_from_slice(&u32::MAX.to_le_bytes());
    assert!(matches!(from_binary(&huge), Err(BundleError::Metadata(_))));
}

#[test]
fn empty_manifest_is_valid() {
    let m = BundleManifest::new(SystemTime::UNIX_EPOCH);
    for format in [MetadataFormat::Binary, MetadataFormat::Json] {
        let bytes = encode_manifest(&m, format).unwrap();
        assert!(decode_manifest(&bytes, format).unwrap().is_empty());
    }
}

#[test]
fn no_spot_orientation_reads_as_absent() {
    let set: TileSet = serde_json::from_str(
        r#"{
            "name": "lamps",
            "image_path": "lamps.png",
            "layout": { "type": "uniform", "width": 16, "height": 16 },
            "kind": "object",
            "sprites": [
                { "owidth": 1, "oheight": 1, "spot": { "x": 3, "y": 4, "orient": -1 } },
                { "owidth": 1, "oheight": 1, "spot": { "x": 3, "y": 4, "orient": 2 } }
            ]
        }"#,
    )
    .unwrap();
    assert_eq!(set.sprites()[0].spot, None);
    assert_eq!(set.sprites()[1].spot, Some(Spot { x: 3, y: 4, orient: 2 }));

    let mut m = BundleManifest::new(SystemTime::now());
    m.insert(5, BundleTileSet::Source(set));
    let bin = encode_manifest(&m, MetadataFormat::Binary).unwrap();
    let json = encode_manifest(&m, MetadataFormat::Json).unwrap();
    let from_bin = decode_manifest(&bin, MetadataFormat::Binary).unwrap();
    let from_json = decode_manifest(&json, MetadataFormat::Json).unwrap();
    assert_same(&from_bin, &from_json);
    assert_same(&m, &from_bin);
}
