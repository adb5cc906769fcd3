use rand::{Rng, SeedableRng};
use rand::rngs::StdRng;
use tilebundle_core::error::BundleError;
use tilebundle_core::model::Rect;
use tilebundle_core::packer::{PackInput, PackLayout, Packer, StripPacker};

fn inputs(sizes: &[(u32, u32)]) -> Vec<PackInput> {
    sizes
        .iter()
        .enumerate()
        .map(|(i, (w, h))| PackInput::new(i, *w, *h))
        .collect()
}

#[test]
fn rows_wrap_at_max_width() {
    let p = StripPacker::new(100);
    let layout = p.pack(&inputs(&[(40, 10), (40, 20), (40, 15), (30, 5)])).unwrap();
    assert_eq!(layout.get(0), Some(Rect::new(0, 0, 40, 10)));
    assert_eq!(layout.get(1), Some(Rect::new(40, 0, 40, 20)));
    // third does not fit next to the first two
    assert_eq!(layout.get(2), Some(Rect::new(0, 20, 40, 15)));
    assert_eq!(layout.get(3), Some(Rect::new(40, 20, 30, 5)));
    assert_eq!((layout.width, layout.height), (80, 35));
    assert!(layout.is_disjoint());
}

#[test]
fn exact_fit_stays_on_the_row() {
    let p = StripPacker::new(64);
    let layout = p.pack(&inputs(&[(32, 8), (32, 8), (1, 1)])).unwrap();
    assert_eq!(layout.get(1), Some(Rect::new(32, 0, 32, 8)));
    assert_eq!(layout.get(2), Some(Rect::new(0, 8, 1, 1)));
    assert_eq!((layout.width, layout.height), (64, 9));
}

#[test]
fn oversized_rect_gets_its_own_row() {
    let p = StripPacker::new(50);
    let layout = p.pack(&inputs(&[(20, 10), (120, 6), (10, 10)])).unwrap();
    assert_eq!(layout.get(1), Some(Rect::new(0, 10, 120, 6)));
    assert_eq!(layout.get(2), Some(Rect::new(0, 16, 10, 10)));
    assert_eq!(layout.width, 120);
    assert!(layout.is_disjoint());
}

#[test]
fn zero_size_rects_take_no_space() {
    let p = StripPacker::new(64);
    let layout = p.pack(&inputs(&[(0, 0), (16, 16), (0, 5), (16, 16)])).unwrap();
    assert_eq!(layout.get(0).unwrap().area(), 0);
    assert_eq!(layout.get(2).unwrap().area(), 0);
    assert_eq!(layout.get(3), Some(Rect::new(16, 0, 16, 16)));
    assert_eq!((layout.width, layout.height), (32, 16));
}

#[test]
fn empty_input_gives_empty_canvas() {
    let layout = StripPacker::default().pack(&[]).unwrap();
    assert_eq!((layout.width, layout.height), (0, 0));
    assert!(layout.placements.is_empty());
}

#[test]
fn zero_width_strip_is_a_config_error() {
    let err = StripPacker::new(0).pack(&inputs(&[(1, 1)])).unwrap_err();
    assert!(matches!(err, BundleError::InvalidConfig(_)));
}

#[test]
fn random_sets_are_disjoint_and_covered() {
    let mut rng = StdRng::seed_from_u64(0x7115);
    for round in 0..50 {
        let n = rng.gen_range(1..60);
        let sizes: Vec<(u32, u32)> = (0..n)
            .map(|_| (rng.gen_range(0..90), rng.gen_range(0..90)))
            .collect();
        let ins = inputs(&sizes);
        let layout = StripPacker::new(256).pack(&ins).unwrap();
        assert_eq!(layout.placements.len(), ins.len(), "round {round}");
        assert!(layout.is_disjoint(), "round {round}");
        let canvas = Rect::new(0, 0, layout.width, layout.height);
        for input in &ins {
            let r = layout.get(input.id).unwrap();
            if input.w > 0 && input.h > 0 {
                assert_eq!((r.w, r.h), (input.w, input.h));
                assert!(canvas.contains(&r), "round {round}: {r:?} outside canvas");
            }
        }
    }
}

#[test]
fn packing_is_deterministic() {
    let sizes = [(12, 40), (33, 7), (64, 64), (5, 5), (90, 2), (17, 17)];
    let p = StripPacker::new(100);
    let a = p.pack(&inputs(&sizes)).unwrap();
    let b = p.pack(&inputs(&sizes)).unwrap();
    assert_eq!(a, b);
}

#[test]
fn canvas_height_overflow_is_a_pack_error() {
    let err = StripPacker::new(10)
        .pack(&inputs(&[(10, u32::MAX), (10, 1)]))
        .unwrap_err();
    assert!(matches!(err, BundleError::Pack(_)));
}

#[test]
fn overlap_is_found_in_any_order() {
    let layout = PackLayout {
        width: 40,
        height: 40,
        placements: vec![
            (0, Rect::new(20, 20, 10, 10)),
            (1, Rect::new(0, 0, 8, 8)),
            (2, Rect::new(0, 30, 40, 10)),
            (3, Rect::new(5, 5, 0, 0)),
            (4, Rect::new(25, 0, 5, 21)),
        ],
    };
    // 4 reaches down into 0 by one row
    assert!(!layout.is_disjoint());

    let mut fixed = layout.clone();
    fixed.placements[4].1.h = 20;
    assert!(fixed.is_disjoint());
}

#[test]
fn placements_index_by_sprite() {
    let layout = StripPacker::new(64).pack(&inputs(&[(8, 8), (0, 0), (4, 4)])).unwrap();
    let index = layout.index_by_id(4).unwrap();
    assert_eq!(index[0], Some(Rect::new(0, 0, 8, 8)));
    assert_eq!(index[2], Some(Rect::new(8, 0, 4, 4)));
    assert_eq!(index[3], None);

    assert!(matches!(layout.index_by_id(2), Err(BundleError::Pack(_))));
    let mut twice = layout.clone();
    twice.placements.push((0, Rect::new(20, 0, 8, 8)));
    assert!(matches!(twice.index_by_id(3), Err(BundleError::Pack(_))));
}
