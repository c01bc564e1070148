mod common;

use common::test_utils::{
    ANIMATION_JSON, RecordingRenderer, asset_dir, counting_callback, write_gltf_triangle,
    write_obj_quad, write_png,
};
use tokio::task::LocalSet;
use vfx_world::{
    World, WorldConfig,
    animation::AnimationData,
    cgmath::Vector3,
    data_structures::{
        material::MultitextureMaterial,
        mesh::{Uv, map_uvs, set_quad_uvs},
    },
    tracker::FailureKind,
};

fn animation() -> AnimationData {
    serde_json::from_str(ANIMATION_JSON).unwrap()
}

#[tokio::test]
async fn loads_a_world_and_flies_the_camera_through_it() {
    let dir = asset_dir("world-flow");
    let quad = write_obj_quad(&dir, "quad.obj");
    let triangle = write_gltf_triangle(&dir, "triangle.gltf");
    let tex1 = write_png(&dir, "tex1.png", 4, 4, [255, 0, 0, 255]);
    let tex2 = write_png(&dir, "tex2.png", 2, 2, [0, 0, 255, 255]);

    LocalSet::new()
        .run_until(async {
            let (fired, on_ready) = counting_callback();
            let config = WorldConfig::new(800, 600, 0.1, 100.0);
            let mut world = World::new(config, animation(), RecordingRenderer::default(), on_ready).unwrap();

            let (texture1, _) = world.load_texture(&tex1).unwrap();
            let (texture2, _) = world.load_texture(&tex2).unwrap();
            let material = MultitextureMaterial::new(texture1.clone()).with_texture2(texture2.clone());
            let quad_handle = world
                .add_model(&quad, material.clone(), |mesh| {
                    map_uvs(mesh, 0, 1, 0.25, 0.25, 0.75, 0.75).unwrap();
                })
                .unwrap();
            let triangle_handle = world
                .add_model(&triangle, material, |mesh| {
                    set_quad_uvs(mesh, 1, [0.0, 0.0, 1.0, 0.0, 1.0, 1.0, 0.0, 1.0]);
                })
                .unwrap();
            assert_eq!(world.tracker().pending(), 4);
            world.start_tracking().unwrap();

            let report = world.ready().await;
            assert!(report.is_complete(), "{:?}", report.failures);
            assert_eq!(fired.get(), 1);
            assert!(texture1.is_complete());
            assert!(texture2.is_complete());

            let quad_id = quad_handle.await.unwrap();
            let triangle_id = triangle_handle.await.unwrap();
            {
                let scene = world.scene();
                assert_eq!(scene.len(), 2);

                let quad = scene.get(quad_id).unwrap();
                assert_eq!(quad.geometry().faces, [vec![0, 1, 2, 3]]);
                let mapped = &quad.geometry().layer(1).unwrap()[0];
                assert_eq!(mapped[0], Uv::new(0.25, 0.25));
                assert_eq!(mapped[2], Uv::new(0.75, 0.75));

                let triangle = scene.get(triangle_id).unwrap();
                assert_eq!(
                    triangle.geometry().positions,
                    [[1.0, 0.0, 0.0], [2.0, 0.0, 0.0], [1.0, 1.0, 0.0]]
                );
                // bottom-left origin after import
                assert_eq!(
                    triangle.geometry().layer(0).unwrap()[0],
                    [Uv::new(0.0, 1.0), Uv::new(1.0, 1.0), Uv::new(0.0, 0.0)]
                );
                assert_eq!(triangle.geometry().layer(1).unwrap()[0].len(), 4);
            }

            world.render(0.0).unwrap();
            world.render(0.5).unwrap();
            world.render(1.0).unwrap();
            let frames = &world.renderer().frames;
            assert_eq!(frames.len(), 3);
            assert_eq!(frames[0].meshes.len(), 2);
            assert!(frames[0].meshes.contains(&quad_id) && frames[0].meshes.contains(&triangle_id));
            assert_eq!(frames[0].camera_position, Vector3::new(0.0, 0.0, 5.0));
            assert_eq!(frames[1].camera_position, Vector3::new(5.0, 0.0, 5.0));
            assert_eq!(frames[2].camera_position, Vector3::new(10.0, 0.0, 5.0));
        })
        .await;
}

#[tokio::test]
async fn broken_models_do_not_block_the_world() {
    let dir = asset_dir("world-broken");
    let broken = dir.join("broken.gltf");
    std::fs::write(&broken, "{ not json").unwrap();
    let broken = broken.to_str().unwrap().to_string();
    let quad = write_obj_quad(&dir, "quad.obj");
    let tex = write_png(&dir, "tex.png", 1, 1, [255, 255, 255, 255]);

    LocalSet::new()
        .run_until(async {
            let (fired, on_ready) = counting_callback();
            let mut world = World::new(
                WorldConfig::default(),
                animation(),
                RecordingRenderer::default(),
                on_ready,
            )
            .unwrap();
            let (texture, _) = world.load_texture(&tex).unwrap();
            let material = MultitextureMaterial::new(texture);
            let broken_handle = world.add_model(&broken, material.clone(), |_| {}).unwrap();
            let quad_handle = world.add_model(&quad, material, |_| {}).unwrap();
            world.start_tracking().unwrap();

            let report = world.ready().await;
            assert_eq!(fired.get(), 1);
            assert_eq!(report.failures.len(), 1);
            assert_eq!(report.failures[0].asset, broken);
            assert_eq!(report.failures[0].kind, FailureKind::Failed);
            assert!(broken_handle.await.is_err());
            quad_handle.await.unwrap();

            assert_eq!(world.scene().len(), 1);
            world.render(0.25).unwrap();
            assert_eq!(world.renderer().frames[0].meshes.len(), 1);
        })
        .await;
}

#[test]
fn camera_poses_are_a_pure_function_of_time() {
    let (_, on_ready) = counting_callback();
    let mut world = World::new(
        WorldConfig::new(1000, 1000, 0.1, 100.0),
        animation(),
        RecordingRenderer::default(),
        on_ready,
    )
    .unwrap();
    world.start_tracking().unwrap();

    world.render(0.7).unwrap();
    let first = world.camera().pose();
    world.render(0.1).unwrap();
    world.render(0.7).unwrap();
    assert_eq!(world.camera().pose(), first);
    // square viewport, so the vertical field of view equals the horizontal one
    assert!((first.fov.0 - 90.0).abs() < 1e-3);
}

#[test]
fn resizing_keeps_the_field_of_view_and_flags_widescreen() {
    let (_, on_ready) = counting_callback();
    let mut world = World::new(
        WorldConfig::new(640, 480, 0.1, 100.0),
        animation(),
        RecordingRenderer::default(),
        on_ready,
    )
    .unwrap();
    let fov = world.camera().fov();
    assert!(!world.widescreen());

    world.resize(1280, 720);
    assert!(world.widescreen());
    assert_eq!(world.camera().fov(), fov);
    assert_eq!(world.renderer().viewports.last(), Some(&(0, 0, 1280, 720)));
    assert_eq!(world.renderer().sizes, [(1280, 720)]);
}
