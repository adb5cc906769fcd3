use image::{Rgba, RgbaImage};
use tilebundle_core::error::{BundleError, Result};
use tilebundle_core::metrics::{MetricsAdjuster, trim_object_tile_set};
use tilebundle_core::model::{
    CellLayout, Rect, RowSpec, Spot, Sprite, TileSet, TileSetKind, TrimResult,
};
use tilebundle_core::packer::{PackInput, PackLayout, Packer, StripPacker};
use tilebundle_core::trimmer::Trimmer;

fn fill(img: &mut RgbaImage, r: Rect, seed: u8) {
    for y in r.y..r.y + r.h {
        for x in r.x..r.x + r.w {
            img.put_pixel(x, y, Rgba([seed, x as u8, y as u8, 255]));
        }
    }
}

fn sprite(xorigin: i32, yorigin: i32) -> Sprite {
    Sprite {
        owidth: 2,
        oheight: 1,
        xorigin,
        yorigin,
        priority: Some(3),
        spot: Some(Spot { x: 4, y: -2, orient: 1 }),
        constraints: Some(vec!["wall".into()]),
    }
}

fn object_set(cells: Vec<Rect>, sprites: Vec<Sprite>) -> TileSet {
    TileSet {
        name: Some("furniture".into()),
        image_path: "furniture.png".into(),
        layout: CellLayout::Explicit { cells },
        kind: TileSetKind::Object { sprites },
        colorizations: None,
    }
}

/// Draws the atlas back onto a blank sheet at the trimmed offsets.
fn render(atlas: &RgbaImage, cell: Rect, trim: &TrimResult, w: u32, h: u32) -> RgbaImage {
    let mut out = RgbaImage::new(w, h);
    let p = trim.placement;
    for y in 0..p.h {
        for x in 0..p.w {
            let px = *atlas.get_pixel(p.x + x, p.y + y);
            out.put_pixel(cell.x + trim.trim_x + x, cell.y + trim.trim_y + y, px);
        }
    }
    out
}

#[test]
fn opaque_and_bordered_sprites() {
    let mut img = RgbaImage::new(22, 12);
    fill(&mut img, Rect::new(0, 0, 10, 10), 10);
    fill(&mut img, Rect::new(12, 2, 8, 8), 20);
    let cells = vec![Rect::new(0, 0, 10, 10), Rect::new(10, 0, 12, 12)];
    let set = object_set(cells, vec![sprite(5, 9), sprite(6, 11)]);

    let packer = StripPacker::default();
    let trimmer = Trimmer::new(&packer);
    let (trimmed, atlas) = trim_object_tile_set(&set, &img, &trimmer, "furniture.raw").unwrap();

    let r0 = atlas.results[0];
    assert_eq!((r0.trim_x, r0.trim_y, r0.placement.w, r0.placement.h), (0, 0, 10, 10));
    let r1 = atlas.results[1];
    assert_eq!((r1.trim_x, r1.trim_y, r1.placement.w, r1.placement.h), (2, 2, 8, 8));

    assert_eq!(trimmed.origin(0), Some((5, 9)));
    assert_eq!(trimmed.origin(1), Some((4, 9)));
    // footprint and the rest of the object data ride along untouched
    assert_eq!(trimmed.base_width(1), Some(2));
    assert_eq!(trimmed.base_height(1), Some(1));
    assert_eq!(trimmed.priority(1), 3);
    assert_eq!((trimmed.x_spot(1), trimmed.y_spot(1), trimmed.spot_orient(1)), (4, -2, 1));
    assert!(trimmed.has_constraint(1, "wall"));
    assert_eq!(trimmed.image_path, "furniture.raw");
    assert_eq!(trimmed.tile_bounds(1), Some(r1.placement));

    assert_eq!(atlas.stats.sprites, 2);
    assert_eq!(atlas.stats.trimmed, 1);
    assert_eq!(atlas.stats.used_area, 100 + 64);
}

#[test]
fn transparent_sprite_is_degenerate_but_kept() {
    let mut img = RgbaImage::new(16, 8);
    fill(&mut img, Rect::new(9, 1, 3, 4), 7);
    let set = object_set(
        vec![Rect::new(0, 0, 8, 8), Rect::new(8, 0, 8, 8)],
        vec![sprite(0, 0), sprite(1, 7)],
    );
    let packer = StripPacker::default();
    let (trimmed, atlas) =
        trim_object_tile_set(&set, &img, &Trimmer::new(&packer), "furniture.raw").unwrap();

    assert!(atlas.results[0].is_degenerate());
    assert_eq!(atlas.results[0].placement, Rect::default());
    assert_eq!(trimmed.tile_count(), 2);
    assert_eq!(trimmed.tile_bounds(0), Some(Rect::default()));
    // the only real sprite owns the whole atlas
    assert_eq!(atlas.results[1].placement, Rect::new(0, 0, 3, 4));
    assert_eq!(atlas.image.dimensions(), (3, 4));
    assert_eq!(atlas.stats.degenerate, 1);
}

#[test]
fn all_transparent_set_gives_one_pixel_atlas() {
    let img = RgbaImage::new(8, 8);
    let packer = StripPacker::default();
    let atlas = Trimmer::new(&packer)
        .trim_cells(&img, &[Rect::new(0, 0, 4, 4), Rect::new(4, 4, 4, 4)])
        .unwrap();
    assert_eq!(atlas.image.dimensions(), (1, 1));
    assert!(atlas.results.iter().all(TrimResult::is_degenerate));
    assert_eq!(atlas.image.get_pixel(0, 0)[3], 0);
}

#[test]
fn trimmed_sprites_render_like_the_source() {
    let mut img = RgbaImage::new(32, 16);
    fill(&mut img, Rect::new(3, 5, 6, 2), 1);
    fill(&mut img, Rect::new(5, 2, 1, 9), 2);
    fill(&mut img, Rect::new(17, 0, 14, 16), 3);
    let cells = [Rect::new(0, 0, 16, 16), Rect::new(16, 0, 16, 16)];
    let packer = StripPacker::new(8);
    let atlas = Trimmer::new(&packer).trim_cells(&img, &cells).unwrap();

    for (cell, trim) in cells.iter().zip(&atlas.results) {
        let drawn = render(&atlas.image, *cell, trim, 32, 16);
        for y in cell.y..cell.y + cell.h {
            for x in cell.x..cell.x + cell.w {
                let want = img.get_pixel(x, y);
                let got = drawn.get_pixel(x, y);
                if want[3] > 0 {
                    assert_eq!(want, got, "pixel ({x},{y})");
                } else {
                    assert_eq!(got[3], 0, "pixel ({x},{y})");
                }
            }
        }
    }
}

#[test]
fn adjusted_origin_is_shifted_by_trim() {
    let s = sprite(-3, 12);
    let trim = TrimResult {
        placement: Rect::new(40, 0, 5, 5),
        trim_x: 7,
        trim_y: 2,
    };
    let m = MetricsAdjuster::adjust(&s, &trim);
    assert_eq!((m.x, m.y, m.width, m.height), (-10, 10, 2, 1));
}

#[test]
fn layout_missing_cells_is_rejected() {
    let img = RgbaImage::new(8, 8);
    let set = object_set(vec![Rect::new(0, 0, 8, 8)], vec![sprite(0, 0), sprite(0, 0)]);
    let packer = StripPacker::default();
    let err = trim_object_tile_set(&set, &img, &Trimmer::new(&packer), "x.raw").unwrap_err();
    assert!(matches!(err, BundleError::InvalidInput(_)));
}

#[test]
fn cells_outside_the_sheet_are_rejected() {
    let img = RgbaImage::new(8, 8);
    let set = object_set(vec![Rect::new(4, 4, 8, 8)], vec![sprite(0, 0)]);
    let packer = StripPacker::default();
    let err = trim_object_tile_set(&set, &img, &Trimmer::new(&packer), "x.raw").unwrap_err();
    assert!(matches!(err, BundleError::CellOutOfBounds { index: 0, .. }));
}

#[test]
fn more_sprites_than_uniform_cells_is_rejected() {
    // 20x10 sheet of 10x10 cells holds two sprites, not three
    let img = RgbaImage::new(20, 10);
    let mut set = object_set(vec![], vec![sprite(0, 0); 3]);
    set.layout = CellLayout::Uniform { width: 10, height: 10 };
    assert_eq!(set.layout.tile_count(20, 10), 2);
    let packer = StripPacker::default();
    let err = trim_object_tile_set(&set, &img, &Trimmer::new(&packer), "x.raw").unwrap_err();
    assert!(matches!(err, BundleError::InvalidInput(_)));

    set.kind = TileSetKind::Object { sprites: vec![sprite(0, 0); 2] };
    assert_eq!(set.sprite_cells(20, 10).unwrap().len(), 2);
}

#[test]
fn overflowing_cell_coordinates_are_rejected() {
    let layout = CellLayout::Rows {
        rows: vec![RowSpec { count: 4, width: u32::MAX / 2, height: 8 }],
        offset: (0, 0),
        gap: (2, 0),
    };
    assert!(layout.cell(1, u32::MAX).is_some());
    assert_eq!(layout.cell(3, u32::MAX), None);

    let uniform = CellLayout::Uniform { width: u32::MAX, height: u32::MAX };
    assert!(uniform.cell(1, 1).is_some());
    assert_eq!(uniform.cell(2, 1), None);

    let mut set = object_set(vec![], vec![sprite(0, 0); 4]);
    set.layout = layout;
    assert!(matches!(set.sprite_cells(64, 64), Err(BundleError::InvalidInput(_))));
}

#[test]
fn plain_sets_are_not_trimmed() {
    let img = RgbaImage::new(8, 8);
    let set = TileSet {
        kind: TileSetKind::Plain,
        ..object_set(vec![Rect::new(0, 0, 8, 8)], vec![])
    };
    let packer = StripPacker::default();
    let err = trim_object_tile_set(&set, &img, &Trimmer::new(&packer), "x.raw").unwrap_err();
    assert!(matches!(err, BundleError::InvalidInput(_)));
}

/// Stacks every rect in a single column.
#[derive(Debug)]
struct ColumnPacker;

impl Packer for ColumnPacker {
    fn name(&self) -> &str {
        "column"
    }

    fn pack(&self, rects: &[PackInput]) -> Result<PackLayout> {
        let mut y = 0;
        let mut width = 0;
        let placements = rects
            .iter()
            .map(|r| {
                let placed = Rect::new(0, y, r.w, r.h);
                y += r.h;
                width = width.max(r.w);
                (r.id, placed)
            })
            .collect();
        Ok(PackLayout {
            width,
            height: y,
            placements,
        })
    }
}

/// Puts everything on top of everything else.
#[derive(Debug)]
struct OverlapPacker;

impl Packer for OverlapPacker {
    fn name(&self) -> &str {
        "overlap"
    }

    fn pack(&self, rects: &[PackInput]) -> Result<PackLayout> {
        Ok(PackLayout {
            width: rects.iter().map(|r| r.w).max().unwrap_or(0),
            height: rects.iter().map(|r| r.h).max().unwrap_or(0),
            placements: rects.iter().map(|r| (r.id, Rect::new(0, 0, r.w, r.h))).collect(),
        })
    }
}

#[test]
fn custom_packer_is_used() {
    let mut img = RgbaImage::new(16, 8);
    fill(&mut img, Rect::new(1, 1, 4, 4), 1);
    fill(&mut img, Rect::new(10, 2, 3, 5), 2);
    let cells = [Rect::new(0, 0, 8, 8), Rect::new(8, 0, 8, 8)];
    let atlas = Trimmer::new(&ColumnPacker).trim_cells(&img, &cells).unwrap();
    assert_eq!(atlas.results[0].placement, Rect::new(0, 0, 4, 4));
    assert_eq!(atlas.results[1].placement, Rect::new(0, 4, 3, 5));
    assert_eq!(atlas.image.dimensions(), (4, 9));
}

#[test]
fn overlapping_layouts_are_rejected() {
    let mut img = RgbaImage::new(16, 8);
    fill(&mut img, Rect::new(1, 1, 4, 4), 1);
    fill(&mut img, Rect::new(10, 2, 3, 5), 2);
    let cells = [Rect::new(0, 0, 8, 8), Rect::new(8, 0, 8, 8)];
    let err = Trimmer::new(&OverlapPacker).trim_cells(&img, &cells).err().unwrap();
    assert!(matches!(err, BundleError::Pack(_)));
}

#[test]
fn source_image_is_untouched() {
    let mut img = RgbaImage::new(16, 8);
    fill(&mut img, Rect::new(2, 2, 3, 3), 9);
    let before = img.clone();
    let packer = StripPacker::default();
    Trimmer::new(&packer)
        .trim_cells(&img, &[Rect::new(0, 0, 8, 8), Rect::new(8, 0, 8, 8)])
        .unwrap();
    assert_eq!(img, before);
}
