use std::collections::BTreeMap;

use detection_waypoints::config::{PipelineConfig, TriangulationConfig};
use detection_waypoints::detected_points::{BBox, Detection, ImageDetections};
use detection_waypoints::geodesy::{ecef_to_geodetic, geodetic_to_ecef};
use detection_waypoints::kml::{SynthesisOptions, edit_placemarks};
use detection_waypoints::pipeline::{
    ObjectRays, plan_from_rays, run_kmz, run_track, track_rays, triangulate_objects,
};
use detection_waypoints::reconstruction::{CameraView, Reconstruction};
use detection_waypoints::tracking::build_tracks;
use detection_waypoints::types::{CameraRay, Geodetic, SimilarityTransform};
use detection_waypoints::{Error, ErrorKind};
use nalgebra as na;

const CENTERS: [[f64; 3]; 3] = [[-5.0, 0.0, -10.0], [0.0, 5.0, -10.0], [5.0, 0.0, -10.0]];

fn intrinsics() -> na::Matrix3<f64> {
    na::Matrix3::new(1000.0, 0.0, 500.0, 0.0, 1000.0, 500.0, 0.0, 0.0, 1.0)
}

/// Three nadir-looking cameras without rotation, `t = -C`.
fn reconstruction() -> Reconstruction {
    Reconstruction::new(
        CENTERS
            .iter()
            .enumerate()
            .map(|(i, c)| CameraView {
                image_id: i as u32 + 1,
                name: format!("img{i}.jpg"),
                intrinsics: intrinsics(),
                rotation: na::Rotation3::identity(),
                translation: -na::Vector3::new(c[0], c[1], c[2]),
                width: 1000,
                height: 1000,
                registered: true,
            })
            .collect(),
    )
}

fn project(view: &CameraView, p: &na::Point3<f64>) -> na::Point2<f64> {
    let cam = view.rotation * p.coords + view.translation;
    let uv = view.intrinsics * (cam / cam.z);
    na::Point2::new(uv.x, uv.y)
}

/// One detection per image, centered on the projection of `object`.
fn detections(rec: &Reconstruction, object: &na::Point3<f64>) -> Vec<ImageDetections> {
    rec.views
        .iter()
        .enumerate()
        .map(|(i, view)| {
            let px = project(view, object);
            ImageDetections {
                name: view.name.clone(),
                width: view.width,
                height: view.height,
                detections: vec![Detection {
                    bbox: BBox::new(px.x - 10.0, px.y - 8.0, px.x + 10.0, px.y + 8.0),
                    class_id: 1,
                    feature: na::DVector::from_vec(vec![1.0, 0.01 * i as f64]),
                }],
            }
        })
        .collect()
}

fn local_to_ecef() -> SimilarityTransform {
    let origin = geodetic_to_ecef(&Geodetic::new(48.1, 11.6, 520.0));
    SimilarityTransform::new(
        2.0,
        na::Rotation3::from_euler_angles(0.1, -0.2, 0.3),
        origin.coords,
    )
}

fn geotags(rec: &Reconstruction, transform: &SimilarityTransform) -> BTreeMap<String, Geodetic> {
    rec.views
        .iter()
        .map(|v| {
            let ecef = transform.apply(&v.projection_center());
            (v.name.clone(), ecef_to_geodetic(&ecef))
        })
        .collect()
}

#[test]
fn test_detections_to_waypoint() {
    let rec = reconstruction();
    let object = na::Point3::new(1.0, 2.0, 20.0);
    let images = detections(&rec, &object);

    let table = build_tracks(&images).unwrap();
    assert_eq!(table.len(), 1);
    let rays = track_rays(&table, &images, &rec).unwrap();
    assert_eq!(rays.len(), 1);
    assert_eq!(rays.values().next().unwrap().len(), 3);

    let transform = local_to_ecef();
    let tags = geotags(&rec, &transform);
    let plan = plan_from_rays(&rays, &rec, &tags, &PipelineConfig::default()).unwrap();

    assert_eq!(plan.cameras, 3);
    assert!(plan.failures.is_empty());
    assert!((plan.registration.transform.scale - 2.0).abs() < 1e-6);
    assert_eq!(plan.points.len(), 1);
    assert!((plan.points[0].local.point - object).norm() < 1e-6);

    let expected = ecef_to_geodetic(&transform.apply(&object));
    assert_eq!(plan.waypoints.len(), 1);
    let wp = &plan.waypoints[0];
    assert!((wp.latitude - expected.latitude).abs() < 1e-7);
    assert!((wp.longitude - expected.longitude).abs() < 1e-7);
    assert!((wp.altitude - expected.altitude).abs() < 1e-3);

    let template = r#"<kml xmlns="http://www.opengis.net/kml/2.2" xmlns:wpml="http://www.dji.com/wpmz/1.0.6">
  <Document>
    <Folder>
      <Placemark>
        <Point><coordinates>0,0</coordinates></Point>
      </Placemark>
    </Folder>
  </Document>
</kml>"#;
    let opts = SynthesisOptions::from_config(&PipelineConfig::default().kml, 0);
    let kml = edit_placemarks(template, &plan.waypoints, &opts).unwrap();
    assert_eq!(kml.matches("<Placemark>").count(), 1);
    let start = kml.find("<coordinates>").unwrap() + "<coordinates>".len();
    let end = kml.find("</coordinates>").unwrap();
    let lon_lat: Vec<f64> = kml[start..end]
        .trim()
        .split(',')
        .map(|v| v.parse().unwrap())
        .collect();
    assert_eq!(lon_lat, vec![wp.longitude, wp.latitude]);

    let report = plan.report(0, table.len());
    assert_eq!(report.points[0].rays, 3);
    assert_eq!(report.registration.cameras, 3);
}

#[test]
fn test_failing_object_is_isolated() {
    let rec = reconstruction();
    let object = na::Point3::new(-1.0, 0.5, 15.0);
    let mut rays = ObjectRays::new();
    for view in &rec.views {
        rays.entry(3)
            .or_default()
            .push(view.ray_through(&project(view, &object)).unwrap());
    }
    rays.insert(
        8,
        vec![CameraRay::new(na::Point3::origin(), na::Vector3::z())],
    );

    let (points, failures) = triangulate_objects(&rays, &TriangulationConfig::default(), 0);
    assert_eq!(points.len(), 1);
    assert_eq!(points[0].0, 3);
    assert!((points[0].1.point - object).norm() < 1e-6);
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].0, 8);
    assert_eq!(failures[0].1.kind(), ErrorKind::Geometry);

    let tags = geotags(&rec, &local_to_ecef());
    let plan = plan_from_rays(&rays, &rec, &tags, &PipelineConfig::default()).unwrap();
    assert_eq!(plan.waypoints.len(), 1);
    assert_eq!(plan.report(0, 2).failures[0].object_id, 8);
}

#[test]
fn test_plan_needs_rays_and_cameras() {
    let rec = reconstruction();
    let tags = geotags(&rec, &local_to_ecef());
    assert!(matches!(
        plan_from_rays(&ObjectRays::new(), &rec, &tags, &PipelineConfig::default()),
        Err(Error::EmptyInput(_))
    ));

    let object = na::Point3::new(0.0, 0.0, 10.0);
    let mut rays = ObjectRays::new();
    for view in &rec.views {
        rays.entry(0)
            .or_default()
            .push(view.ray_through(&project(view, &object)).unwrap());
    }
    // two geotags are not enough to register
    let partial: BTreeMap<String, Geodetic> = tags.into_iter().take(2).collect();
    let err = plan_from_rays(&rays, &rec, &partial, &PipelineConfig::default()).unwrap_err();
    assert!(matches!(err, Error::NotEnoughPoints { .. }), "{err}");
}

#[test]
fn test_run_track_writes_labels() {
    let images = tempfile::tempdir().unwrap();
    let detections = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    for name in ["a", "b", "c"] {
        image::RgbImage::from_pixel(64, 64, image::Rgb([200u8, 40, 40]))
            .save(images.path().join(format!("{name}.png")))
            .unwrap();
        std::fs::write(
            detections.path().join(format!("{name}.txt")),
            "1 0.5 0.5 0.25 0.25\n0 0.1 0.1 0.1 0.1\n",
        )
        .unwrap();
    }

    let table = run_track(
        images.path(),
        detections.path(),
        output.path(),
        &PipelineConfig::default(),
    )
    .unwrap();
    assert_eq!(table.len(), 1);
    for name in ["a", "b", "c"] {
        let labels = std::fs::read_to_string(output.path().join(format!("{name}.txt"))).unwrap();
        assert_eq!(labels.trim(), "0 0.5 0.5 0.25 0.25");
    }
    assert!(output.path().join("tracks.json").is_file());
}

#[test]
fn test_run_kmz_from_json() {
    let dir = tempfile::tempdir().unwrap();
    let template = dir.path().join("template.kml");
    std::fs::write(
        &template,
        r#"<kml xmlns="http://www.opengis.net/kml/2.2" xmlns:wpml="http://www.dji.com/wpmz/1.0.6"><Document><Folder><Placemark><Point><coordinates>0,0</coordinates></Point></Placemark></Folder></Document></kml>"#,
    )
    .unwrap();
    let waypoints = dir.path().join("waypoints.json");
    std::fs::write(
        &waypoints,
        r#"[{"lat": 48.0, "lng": 11.0}, {"lat": 48.1, "lon": 11.1, "height": 15}]"#,
    )
    .unwrap();
    let output = dir.path().join("out").join("mission.kmz");

    let count = run_kmz(&waypoints, dir.path(), &output, &PipelineConfig::default()).unwrap();
    assert_eq!(count, 2);
    assert!(output.is_file());
}
