use glam::{DMat4, DQuat, DVec3, DVec4};
use panorama_renderer::config::{PanoramaSource, ViewerConfig};
use panorama_renderer::geometry::build_sphere;
use panorama_renderer::material::MeshBasicMaterial;
use panorama_renderer::math::Matrix4;
use panorama_renderer::scene::{Camera, Mesh, Object3D, Scene, Transformable3D};
use panorama_renderer::{ConfigError, MathError};

fn trs(t: [f64; 3], r: [f64; 3], s: [f64; 3]) -> DMat4 {
    DMat4::from_scale_rotation_translation(
        DVec3::from(s),
        DQuat::from_euler(glam::EulerRot::ZYX, r[2], r[1], r[0]),
        DVec3::from(t),
    )
}

#[test]
fn world_matrices_compose_root_to_leaf() {
    let mut scene = Scene::new();

    let mut parent = Object3D::new();
    parent.set_position(10.0, 0.0, 0.0).set_rotation(0.0, 0.5, 0.0);
    let parent = scene.add_object(parent);

    let mut child = Object3D::new();
    child.set_position(0.0, 2.0, 0.0).set_scale(2.0, 2.0, 2.0);
    let child = scene.insert(child);
    scene.add_child(parent, child).unwrap();

    scene.update();

    let expected = trs([10.0, 0.0, 0.0], [0.0, 0.5, 0.0], [1.0; 3])
        * trs([0.0, 2.0, 0.0], [0.0; 3], [2.0; 3]);
    let got = DMat4::from(scene.object(child).unwrap().matrix_world());
    assert!(got.abs_diff_eq(expected, 1e-9), "{got:?}\n{expected:?}");

    // No mutation, no change.
    let before = *scene.object(child).unwrap().matrix_world();
    scene.update();
    assert_eq!(*scene.object(child).unwrap().matrix_world(), before);
}

#[test]
fn reparenting_moves_subtree() {
    let mut scene = Scene::new();
    let mut a = Object3D::new();
    a.set_position(5.0, 0.0, 0.0);
    let a = scene.add_object(a);
    let b = scene.add_object(Object3D::new());
    let leaf = scene.insert(Object3D::new());

    scene.add_child(a, leaf).unwrap();
    scene.update();
    assert_eq!(scene.object(leaf).unwrap().matrix_world().position().x, 5.0);

    scene.add_child(b, leaf).unwrap();
    scene.update();
    assert_eq!(scene.object(leaf).unwrap().matrix_world().position().x, 0.0);

    assert!(scene.add_child(leaf, b).is_err());
}

#[test]
fn perspective_maps_near_and_far_planes() {
    let p = Matrix4::make_perspective(70.0, 1.5, 1.0, 1100.0).unwrap();
    let reference = DMat4::perspective_rh_gl(70f64.to_radians(), 1.5, 1.0, 1100.0);
    assert!(DMat4::from(&p).abs_diff_eq(reference, 1e-9));

    for (z, ndc) in [(-1.0, -1.0), (-1100.0, 1.0)] {
        let clip = reference * DVec4::new(0.0, 0.0, z, 1.0);
        assert!((clip.z / clip.w - ndc).abs() < 1e-9);
    }

    assert!(matches!(
        Matrix4::make_perspective(0.0, 1.0, 1.0, 10.0),
        Err(MathError::DegenerateFrustum { .. })
    ));
}

#[test]
fn camera_looks_at_target() {
    let mut camera = Camera::new(70.0, 1.0, 1.0, 1100.0).unwrap();
    camera.target.x = 500.0;
    camera.update(None, true).unwrap();

    // The target ends up straight ahead, on the -z axis in view space.
    let mut p = camera.target;
    camera.matrix_world_inverse().multiply_vector3(&mut p);
    assert!(p.x.abs() < 1e-9 && p.y.abs() < 1e-9);
    assert!((p.z + 500.0).abs() < 1e-9);
}

#[test]
fn inverted_sphere_keeps_its_bound() {
    let mut mesh = Mesh::new(build_sphere(500.0, 60, 40), MeshBasicMaterial::default());
    mesh.object3d_mut().scale_mut().x = -1.0;
    assert!((mesh.object3d().bound_radius() - 500.0).abs() < 1e-6);

    let mut scene = Scene::new();
    let id = scene.add_object(mesh);
    scene.update();
    let world = scene.mesh(id).unwrap().matrix_world();
    assert!(world.determinant() < 0.0);
    assert_eq!(scene.objects(), &[id]);
}

#[test]
fn tour_file_resolves_paths_next_to_it() {
    let dir = std::env::temp_dir().join(format!("panorama-tour-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("tour.json");
    std::fs::write(
        &path,
        r#"{
            "default": { "firstScene": "lobby" },
            "scenes": {
                "lobby": { "panorama": "lobby.jpg", "minHfov": 40 },
                "roof": { "type": "cubemap", "cubeMap": ["f", "r", "b", "l", "u", "d"] }
            }
        }"#,
    )
    .unwrap();

    let config = ViewerConfig::load(&path).unwrap();
    let lobby = config.resolve(None).unwrap();
    assert_eq!(lobby.source, PanoramaSource::Equirectangular(dir.join("lobby.jpg")));
    assert_eq!(lobby.min_hfov, 40.0);

    let roof = config.resolve(Some("roof")).unwrap();
    match roof.source {
        PanoramaSource::CubeMap(faces) => assert_eq!(faces[4], dir.join("u")),
        other => panic!("unexpected {other:?}"),
    }

    std::fs::write(&path, "{ not json").unwrap();
    assert!(matches!(ViewerConfig::load(&path), Err(ConfigError::Parse(_))));
    std::fs::remove_dir_all(&dir).ok();
}
