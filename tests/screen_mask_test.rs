use mapscout::render::{ScreenMask, ScreenPixelRectangle, ScreenRectMask};

fn mask(screen_width: usize, x: i32, y: i32, width: i32, height: i32) -> ScreenRectMask {
    ScreenRectMask::new(screen_width, ScreenPixelRectangle::new(x, y, width, height))
}

fn collides(a: (i32, i32, i32, i32), b: (i32, i32, i32, i32)) -> bool {
    let mut screen = ScreenMask::new(100, 100);
    screen.add_mask(&mask(100, a.0, a.1, a.2, a.3));
    screen.has_collision(&mask(100, b.0, b.1, b.2, b.3))
}

#[test]
fn test_rect_mask_single_cell() {
    let m = mask(100, 10, 10, 10, 10);
    assert_eq!(m.first_row(), 10);
    assert_eq!(m.last_row(), 19);
    assert_eq!(m.first_cell(), 0);
    assert_eq!(m.last_cell(), 0);
    assert_eq!(m.cell(0), 0xffc00);

    let m = mask(100, 53, 10, 10, 10);
    assert_eq!((m.first_cell(), m.last_cell()), (0, 0));

    let m = mask(200, 64, 10, 10, 10);
    assert_eq!((m.first_cell(), m.last_cell()), (1, 1));
    assert_eq!(m.cell(1), 0x3ff);
    assert_eq!(m.cell(0), 0);
}

#[test]
fn test_rect_mask_spanning_cells() {
    let m = mask(200, 32, 10, 64, 10);
    assert_eq!((m.first_cell(), m.last_cell()), (0, 1));
    assert_eq!(m.cell(0), 0xffffffff00000000);
    assert_eq!(m.cell(1), 0xffffffff);

    let m = mask(200, 32, 10, 128, 10);
    assert_eq!((m.first_cell(), m.last_cell()), (0, 2));
    assert_eq!(m.cell(0), 0xffffffff00000000);
    assert_eq!(m.cell(1), u64::MAX);
    assert_eq!(m.cell(2), 0xffffffff);
}

#[test]
fn test_rect_mask_clipped_to_screen() {
    let m = mask(200, -5, 10, 10, 10);
    assert_eq!(m.first_cell(), 0);
    assert_eq!(m.cell(0), 0x1f);

    let m = mask(10, 5, 10, 10, 10);
    assert_eq!(m.cell(0), 0x3e0);
}

#[test]
fn test_no_collision_for_adjacent_rects() {
    // horizontal, touching and with a gap
    assert!(!collides((10, 10, 10, 10), (20, 10, 10, 10)));
    assert!(!collides((10, 10, 10, 10), (21, 10, 10, 10)));
    // vertical, touching and with a gap
    assert!(!collides((10, 10, 10, 10), (10, 20, 10, 10)));
    assert!(!collides((10, 10, 10, 10), (10, 21, 10, 10)));
    // diagonal corner contact
    assert!(!collides((10, 10, 10, 10), (20, 20, 10, 10)));
}

#[test]
fn test_collision_for_one_pixel_overlap() {
    assert!(collides((10, 10, 10, 10), (19, 10, 10, 10)));
    assert!(collides((10, 10, 10, 10), (10, 19, 10, 10)));
    assert!(collides((10, 10, 10, 10), (19, 19, 10, 10)));
    assert!(collides((10, 10, 10, 10), (5, 5, 10, 10)));
}

#[test]
fn test_collision_on_large_screen() {
    let (width, height) = (3212, 2039);
    let mut screen = ScreenMask::new(width, height);

    let label = ScreenRectMask::new(width, ScreenPixelRectangle::new(1520, 994, 173, 28));
    screen.add_mask(&label);

    let overlapping = ScreenRectMask::new(width, ScreenPixelRectangle::new(1600, 1010, 120, 30));
    assert!(screen.has_collision(&overlapping));

    let below = ScreenRectMask::new(width, ScreenPixelRectangle::new(1520, 1022, 173, 28));
    assert!(!screen.has_collision(&below));

    screen.clear();
    assert!(!screen.has_collision(&overlapping));
}
