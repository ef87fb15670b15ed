use detection_waypoints::appearance::{AppearanceEncoder, ColorHistogramEncoder};
use detection_waypoints::detected_points::BBox;
use image::{DynamicImage, Rgb, RgbImage};

fn half_red_half_blue() -> DynamicImage {
    let img = RgbImage::from_fn(40, 20, |x, _| {
        if x < 20 { Rgb([255, 0, 0]) } else { Rgb([0, 0, 255]) }
    });
    DynamicImage::ImageRgb8(img)
}

#[test]
fn test_solid_crop_is_one_hot_per_channel() {
    let encoder = ColorHistogramEncoder::new(8);
    assert_eq!(encoder.dimension(), 24);

    let red = encoder.encode(&half_red_half_blue(), &BBox::new(2.0, 2.0, 12.0, 18.0));
    assert_eq!(red.len(), 24);
    let mut expected = vec![0.0; 24];
    expected[7] = 1.0;
    expected[8] = 1.0;
    expected[16] = 1.0;
    assert_eq!(red.as_slice(), expected.as_slice());
}

#[test]
fn test_mixed_crop_splits_mass() {
    let encoder = ColorHistogramEncoder::new(4);
    let full = encoder.encode(&half_red_half_blue(), &BBox::new(0.0, 0.0, 40.0, 20.0));
    for channel in 0..3 {
        let sum: f64 = full.rows(channel * 4, 4).sum();
        assert!((sum - 1.0).abs() < 1e-12);
    }
    assert!((full[3] - 0.5).abs() < 1e-12);
    assert!((full[0] - 0.5).abs() < 1e-12);

    let red = encoder.encode(&half_red_half_blue(), &BBox::new(0.0, 0.0, 10.0, 10.0));
    let blue = encoder.encode(&half_red_half_blue(), &BBox::new(30.0, 0.0, 40.0, 10.0));
    assert!((&red - &full).norm() < (&red - &blue).norm());
}

#[test]
fn test_box_outside_image() {
    let encoder = ColorHistogramEncoder::new(8);
    let img = half_red_half_blue();
    assert!(encoder.encode(&img, &BBox::new(50.0, 50.0, 60.0, 60.0)).iter().all(|v| *v == 0.0));
    // partially outside is clamped to the visible part
    let clamped = encoder.encode(&img, &BBox::new(-10.0, -10.0, 5.0, 5.0));
    assert_eq!(clamped[7], 1.0);
    assert_eq!(ColorHistogramEncoder::new(0).dimension(), 3);
}
