use detection_waypoints::Error;
use detection_waypoints::reconstruction::{load_colmap_text, parse_colmap_text};
use nalgebra as na;

const CAMERAS: &str = "# Camera list with one line of data per camera:
#   CAMERA_ID, MODEL, WIDTH, HEIGHT, PARAMS[]
1 SIMPLE_RADIAL 4000 3000 3000.0 2000.0 1500.0 0.01
2 PINHOLE 640 480 500.0 510.0 320.0 240.0
";

// the first image has an empty points line, the second a populated one
const IMAGES: &str = "# Image list with two lines of data per image:
#   IMAGE_ID, QW, QX, QY, QZ, TX, TY, TZ, CAMERA_ID, NAME
#   POINTS2D[] as (X, Y, POINT3D_ID)
1 1.0 0.0 0.0 0.0 -1.0 -2.0 -3.0 1 DJI_0001.JPG

2 0.7071067811865476 0.0 0.0 0.7071067811865476 0.0 0.0 5.0 2 DJI_0002.JPG
100.0 200.0 -1 300.5 10.0 7
";

#[test]
fn test_parse_colmap_text() {
    let rec = parse_colmap_text(CAMERAS, IMAGES).unwrap();
    assert_eq!(rec.views.len(), 2);
    assert_eq!(rec.registered().count(), 2);

    let first = &rec.views[0];
    assert_eq!(first.name, "DJI_0001.JPG");
    assert_eq!((first.width, first.height), (4000, 3000));
    assert_eq!(first.intrinsics[(0, 0)], 3000.0);
    assert_eq!(first.intrinsics[(1, 1)], 3000.0);
    assert_eq!(first.intrinsics[(0, 2)], 2000.0);
    assert!((first.projection_center() - na::Point3::new(1.0, 2.0, 3.0)).norm() < 1e-12);

    let second = &rec.views[1];
    assert_eq!(second.intrinsics[(1, 1)], 510.0);
    // 90 degrees about z: C = -R^T t stays on the z axis
    assert!((second.projection_center() - na::Point3::new(0.0, 0.0, -5.0)).norm() < 1e-9);
}

#[test]
fn test_rays_through_pixels() {
    let rec = parse_colmap_text(CAMERAS, IMAGES).unwrap();
    let view = &rec.views[1];

    let principal = view.ray_through(&na::Point2::new(320.0, 240.0)).unwrap();
    let optical_axis = view.rotation.inverse() * na::Vector3::z();
    assert!((principal.direction.into_inner() - optical_axis).norm() < 1e-12);

    // a world point projects back onto the pixel its ray goes through
    let world = na::Point3::new(0.3, -0.2, 4.0);
    let cam = view.rotation * world.coords + view.translation;
    let uv = view.intrinsics * (cam / cam.z);
    let ray = view.ray_through(&na::Point2::new(uv.x, uv.y)).unwrap();
    assert!(ray.distance_to(&world) < 1e-9);
}

#[test]
fn test_find_by_name_or_stem() {
    let rec = parse_colmap_text(CAMERAS, IMAGES).unwrap();
    assert_eq!(rec.find("DJI_0002.JPG").unwrap().image_id, 2);
    assert_eq!(rec.find("DJI_0002").unwrap().image_id, 2);
    assert_eq!(rec.find("DJI_0002.txt").unwrap().image_id, 2);
    assert!(rec.find("DJI_0003").is_none());
}

#[test]
fn test_invalid_reconstruction() {
    let unknown_camera = "1 1.0 0.0 0.0 0.0 0.0 0.0 0.0 9 a.jpg\n\n";
    assert!(matches!(
        parse_colmap_text(CAMERAS, unknown_camera),
        Err(Error::InvalidReconstruction(_))
    ));
    assert!(matches!(
        parse_colmap_text("1 PINHOLE 640 480 500.0\n", ""),
        Err(Error::InvalidReconstruction(_))
    ));
    assert!(matches!(
        parse_colmap_text("1 PINHOLE wide 480 1 1 1 1\n", ""),
        Err(Error::InvalidReconstruction(_))
    ));
}

#[test]
fn test_load_colmap_text_dir() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("cameras.txt"), CAMERAS).unwrap();
    std::fs::write(dir.path().join("images.txt"), IMAGES).unwrap();
    let rec = load_colmap_text(dir.path()).unwrap();
    assert_eq!(rec.views.len(), 2);

    let missing = tempfile::tempdir().unwrap();
    assert!(matches!(load_colmap_text(missing.path()), Err(Error::Io(_))));
}
