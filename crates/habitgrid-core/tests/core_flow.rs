use std::ffi::OsString;
use std::fs;

use chrono::{NaiveDate, Utc};
use habitgrid_core::datastore::DataStore;
use habitgrid_core::habit::Mark;
use habitgrid_core::heatmap::{HeatmapRenderer, HeatmapStyle, Labels};
use habitgrid_core::{GridError, build};
use image::Rgb;
use tempfile::tempdir;

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).expect("valid date")
}

#[test]
fn marks_flow_from_store_to_png() {
    let temp = tempdir().expect("tempdir");
    let store = DataStore::open(temp.path()).expect("open datastore");
    let now = Utc::now();

    let habit = store.add_habit("Morning run", now).expect("add habit");
    store
        .set_mark(habit.uuid, d(2024, 3, 1), Mark::Done, now)
        .expect("mark");
    store
        .set_mark(habit.uuid, d(2024, 3, 2), Mark::Cancel, now)
        .expect("mark");

    let statuses = store.status_map(habit.uuid).expect("status map");
    let grid = build(&statuses, d(2024, 2, 26), d(2024, 3, 3)).expect("grid");
    assert_eq!(grid.num_weeks(), 1);
    assert_eq!(grid.value(0, 4), Some(1));
    assert_eq!(grid.value(0, 5), Some(0));
    assert_eq!(grid.done_count(), 1);

    let renderer = HeatmapRenderer::new(HeatmapStyle::default());
    let labels = Labels::default();
    let layout = renderer
        .layout(&grid, &labels, Some(&habit.name))
        .expect("layout");
    let png = renderer
        .render(&grid, &labels, Some(&habit.name))
        .expect("render");

    let img = image::load_from_memory(&png).expect("decode").to_rgb8();
    assert_eq!((img.width(), img.height()), (layout.width, layout.height));

    let centre = |week: usize, row: usize| {
        let (x, y) = layout.cell_origin(week, row);
        *img.get_pixel(x + layout.cell / 2 + 3, y + 2)
    };
    assert_eq!(centre(0, 4), HeatmapStyle::default().done);
    assert_eq!(centre(0, 5), HeatmapStyle::default().not_done);
}

#[test]
fn reversed_window_is_rejected_before_rendering() {
    let err = build(&Default::default(), d(2024, 3, 2), d(2024, 3, 1)).expect_err("reversed");
    assert_eq!(
        err,
        GridError::InvalidRange {
            start: d(2024, 3, 2),
            end: d(2024, 3, 1),
        }
    );
}

#[test]
fn cli_view_writes_a_png() {
    let temp = tempdir().expect("tempdir");
    let rc = temp.path().join("habitrc");
    fs::write(&rc, "heatmap.cell = 16\n").expect("write rc");
    let data = temp.path().join("data");
    let out = temp.path().join("run.png");

    let run = |args: &[&str]| {
        let mut argv: Vec<OsString> = vec![
            "habit".into(),
            "--habitrc".into(),
            rc.clone().into_os_string(),
            "--data".into(),
            data.clone().into_os_string(),
        ];
        argv.extend(args.iter().map(OsString::from));
        habitgrid_core::run(argv)
    };

    run(&["add", "Read"]).expect("add");
    run(&["1", "done", "date:2024-03-01"]).expect("done");
    run(&["done", "Read", "date:2024-02-28"]).expect("done by name");
    run(&[
        "1",
        "view",
        "from:2024-02-28",
        "to:2024-03-02",
        &format!("out:{}", out.display()),
        "title:off",
    ])
    .expect("view");

    let png = fs::read(&out).expect("png written");
    assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");
    let img = image::load_from_memory(&png).expect("decode").to_rgb8();
    assert!(img.pixels().any(|p| *p == Rgb([0x4C, 0xAF, 0x50])));

    let store = DataStore::open(&data).expect("reopen");
    let habits = store.load_habits().expect("habits");
    let map = store.status_map(habits[0].uuid).expect("map");
    assert_eq!(map.len(), 2);
    assert!(map.is_done(d(2024, 2, 28)));

    assert!(run(&["1", "view", "from:2024-03-05", "to:2024-03-01"]).is_err());
    let err = run(&["1", "view", "days:200000000"]).expect_err("window too long");
    assert!(format!("{err:#}").contains("out of range"), "{err:#}");
    assert!(run(&["frobnicate"]).is_err());
}
