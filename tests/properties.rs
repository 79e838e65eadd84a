use proptest::prelude::*;
use std::cmp::Ordering;
use tilescape::input::compare_labels;
use tilescape::prelude::*;
use tilescape::tiles::{BlankTileSource, TileInbox, TileWindowController};

const VIEWPORT: (u32, u32) = (800, 600);

fn controller(config: SceneConfig, lod: f64) -> (TileWindowController, TileInbox) {
    let inbox = TileInbox::new();
    let mut controller = TileWindowController::new(
        config,
        ProjectionKind::Mercator.build(),
        VIEWPORT,
        "base",
        Box::new(BlankTileSource),
        inbox.reply(),
    );
    controller
        .zoom_to_geo_position(LonLat::from_degrees(0.0, 0.0), lod, GoTo::default())
        .unwrap();
    (controller, inbox)
}

fn center() -> Point {
    Point::new(VIEWPORT.0 as f64 / 2.0, VIEWPORT.1 as f64 / 2.0)
}

proptest! {
    #[test]
    fn pans_never_leave_the_border_tolerance(
        tolerance in 0.0f64..50.0,
        moves in prop::collection::vec((-3000.0f64..3000.0, -3000.0f64..3000.0), 1..40)
    ) {
        let config = SceneConfig {
            max_pixel_beyond_poles: tolerance,
            ..SceneConfig::default()
        };
        let (mut controller, _inbox) = controller(config, 3.0);
        let border = controller.border_pixels(3.0);
        let height = VIEWPORT.1 as f64;
        for (dx, dy) in moves {
            let before = controller.view();
            let outcome = controller.move_by(dx, dy);
            let view = controller.view();
            prop_assert!(view.top >= border.min.y - tolerance - 1e-6);
            prop_assert!(view.top + height <= border.max.y + tolerance + 1e-6);
            // longitude is unbounded without east/west limits
            prop_assert!((before.left - dx - view.left).abs() < 1e-6);
            prop_assert!((outcome.applied.x - dx).abs() < 1e-6);
        }
    }

    #[test]
    fn wheel_ticks_land_on_the_next_lod(
        ticks in 1u32..=16,
        start in 3u32..=15,
        zoom_in in any::<bool>()
    ) {
        let (mut controller, _inbox) = controller(SceneConfig::default(), start as f64);
        let step = (if zoom_in { 1.0 } else { -1.0 }) / ticks as f64;
        for _ in 0..ticks {
            controller.zoom_by(2_f64.powf(step), center(), Some(ticks));
        }
        let expected = (if zoom_in { start + 1 } else { start - 1 }) as f64;
        prop_assert_eq!(controller.view().exact_lod, expected);
    }

    #[test]
    fn label_order_is_antisymmetric(a in "[a-cA-C0-2 ]{0,6}", b in "[a-cA-C0-2 ]{0,6}") {
        let forward = compare_labels(&a, &b);
        prop_assert_eq!(forward, compare_labels(&b, &a).reverse());
        prop_assert_eq!(forward == Ordering::Equal, a == b);
    }
}
