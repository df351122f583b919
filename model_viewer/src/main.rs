//! Model viewer demo
//!
//! Renders a spinning checkerboard-textured cube through the forward
//! renderer: one window, one draw layer, one object.

mod window;

use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Instant;

use ash::vk;
use glfw::{Action, Key, WindowEvent};
use render_engine::{
    AntiAliasing, CommandRole, CommandStream, DeviceContext, DrawLayer, DrawObject, Mat4,
    Material, MaterialFeatures, MaterialTextures, Mesh, Point3, PointLight, SurfaceFactory,
    SurfaceState, Texture, Vec2, Vec3, Vec4, Vertex3D, Window,
};

use crate::window::AppWindow;

const WIDTH: u32 = 1280;
const HEIGHT: u32 = 720;

fn shader_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("shaders")
        .join(name)
}

/// Append one quad face to the cube being built.
fn face(
    vertices: &mut Vec<Vertex3D>,
    indices: &mut Vec<u32>,
    normal: Vec3,
    tangent: Vec3,
    corners: [Vec3; 4],
) {
    let base = vertices.len() as u32;
    let uvs = [
        Vec2::new(0.0, 0.0),
        Vec2::new(1.0, 0.0),
        Vec2::new(1.0, 1.0),
        Vec2::new(0.0, 1.0),
    ];
    for (corner, uv) in corners.into_iter().zip(uvs) {
        vertices.push(Vertex3D {
            position: corner,
            normal,
            color: Vec3::new(1.0, 1.0, 1.0),
            uv,
            tangent: Vec4::new(tangent.x, tangent.y, tangent.z, 1.0),
        });
    }
    indices.extend_from_slice(&[base, base + 1, base + 2, base + 2, base + 3, base]);
}

/// A unit cube with per-face normals, UVs, and tangents.
fn cube_mesh() -> Mesh {
    let mut vertices = Vec::with_capacity(24);
    let mut indices = Vec::with_capacity(36);
    let (p, n) = (0.5, -0.5);

    // +Z
    face(
        &mut vertices,
        &mut indices,
        Vec3::z(),
        Vec3::x(),
        [
            Vec3::new(n, n, p),
            Vec3::new(p, n, p),
            Vec3::new(p, p, p),
            Vec3::new(n, p, p),
        ],
    );
    // -Z
    face(
        &mut vertices,
        &mut indices,
        -Vec3::z(),
        -Vec3::x(),
        [
            Vec3::new(p, n, n),
            Vec3::new(n, n, n),
            Vec3::new(n, p, n),
            Vec3::new(p, p, n),
        ],
    );
    // +X
    face(
        &mut vertices,
        &mut indices,
        Vec3::x(),
        -Vec3::z(),
        [
            Vec3::new(p, n, p),
            Vec3::new(p, n, n),
            Vec3::new(p, p, n),
            Vec3::new(p, p, p),
        ],
    );
    // -X
    face(
        &mut vertices,
        &mut indices,
        -Vec3::x(),
        Vec3::z(),
        [
            Vec3::new(n, n, n),
            Vec3::new(n, n, p),
            Vec3::new(n, p, p),
            Vec3::new(n, p, n),
        ],
    );
    // +Y
    face(
        &mut vertices,
        &mut indices,
        Vec3::y(),
        Vec3::x(),
        [
            Vec3::new(n, p, p),
            Vec3::new(p, p, p),
            Vec3::new(p, p, n),
            Vec3::new(n, p, n),
        ],
    );
    // -Y
    face(
        &mut vertices,
        &mut indices,
        -Vec3::y(),
        Vec3::x(),
        [
            Vec3::new(n, n, n),
            Vec3::new(p, n, n),
            Vec3::new(p, n, p),
            Vec3::new(n, n, p),
        ],
    );

    Mesh::new(vertices, indices, 0)
}

/// RGBA checkerboard pixels, `size` x `size` with `square`-pixel cells.
fn checkerboard_pixels(size: u32, square: u32) -> Vec<u8> {
    let mut pixels = Vec::with_capacity((size * size * 4) as usize);
    for y in 0..size {
        for x in 0..size {
            let even = ((x / square) + (y / square)) % 2 == 0;
            if even {
                pixels.extend_from_slice(&[230, 230, 230, 255]);
            } else {
                pixels.extend_from_slice(&[40, 40, 160, 255]);
            }
        }
    }
    pixels
}

fn main() {
    env_logger::init();
    log::info!("starting model viewer");

    let app_window = AppWindow::new("Model Viewer", WIDTH, HEIGHT).expect("window creation failed");
    let extensions = app_window
        .required_instance_extensions()
        .expect("GLFW reported no Vulkan surface extensions");
    let app_window = Rc::new(RefCell::new(app_window));

    let ctx = match DeviceContext::initialize("model_viewer", 1, cfg!(debug_assertions), &extensions)
    {
        Ok(ctx) => Rc::new(ctx),
        Err(e) => {
            log::error!("device initialization failed: {e}");
            std::process::exit(1);
        }
    };

    let factory_window = Rc::clone(&app_window);
    let factory: SurfaceFactory = Box::new(move |instance| {
        factory_window.borrow_mut().create_vulkan_surface(instance)
    });

    // The framebuffer can be larger than the requested window size on
    // high-DPI displays.
    let (fb_width, fb_height) = app_window.borrow().get_framebuffer_size();
    let mut render_window = Window::new(
        Rc::clone(&ctx),
        factory,
        fb_width,
        fb_height,
        AntiAliasing::Msaa4,
    );

    let mut layer = DrawLayer::new(
        Rc::clone(&ctx),
        &render_window,
        shader_path("mesh.vert.spv"),
        shader_path("mesh.frag.spv"),
    );

    let upload = CommandStream::new(&ctx, CommandRole::Primary);
    let pixels = checkerboard_pixels(256, 32);
    let checkerboard = Rc::new(Texture::from_pixels(
        &ctx,
        upload.pool(),
        &pixels,
        256,
        256,
        vk::Format::R8G8B8A8_SRGB,
    ));
    let material = Material::new(
        &ctx,
        MaterialTextures {
            diffuse: Some(checkerboard),
            ..Default::default()
        },
        MaterialFeatures::empty(),
    );
    let cube = Rc::new(RefCell::new(DrawObject::new(
        &ctx,
        upload.pool(),
        vec![cube_mesh()],
        vec![material],
    )));
    layer.add_object(Rc::clone(&cube));

    let layer = Rc::new(RefCell::new(layer));
    render_window.add_layer(layer.clone());

    let mut point_lights = [PointLight::default(); 4];
    point_lights[0] = PointLight::at(3.0, 3.0, 3.0);
    point_lights[1] = PointLight {
        position: Vec4::new(-3.0, 2.0, -2.0, 0.0),
        color: Vec4::new(0.4, 0.5, 0.9, 0.0),
        ..Default::default()
    };
    // The remaining slots stay dark
    point_lights[2].color = Vec4::new(0.0, 0.0, 0.0, 0.0);
    point_lights[3].color = Vec4::new(0.0, 0.0, 0.0, 0.0);

    let camera_position = Vec3::new(0.0, 1.5, 4.0);
    let start = Instant::now();

    while !app_window.borrow().should_close() {
        app_window.borrow_mut().poll_events();
        let events = app_window.borrow().drain_events();
        for (_, event) in events {
            match event {
                WindowEvent::Key(Key::Escape, _, Action::Press, _)
                | WindowEvent::Close => {
                    app_window.borrow_mut().set_should_close(true);
                }
                WindowEvent::FramebufferSize(width, height) => {
                    render_window.set_extent(width.max(0) as u32, height.max(0) as u32);
                }
                _ => {}
            }
        }

        if render_window.state() != SurfaceState::Ready {
            continue;
        }

        let angle = start.elapsed().as_secs_f32() * 0.8;
        cube.borrow_mut().set_model(Mat4::new_rotation(Vec3::y() * angle));

        let extent = render_window.extent();
        let aspect = extent.width as f32 / extent.height as f32;
        let mut projection = Mat4::new_perspective(aspect, 60.0f32.to_radians(), 0.1, 100.0);
        projection[(1, 1)] *= -1.0; // Vulkan clip space points Y down
        let view = Mat4::look_at_rh(
            &Point3::new(camera_position.x, camera_position.y, camera_position.z),
            &Point3::origin(),
            &Vec3::y(),
        );

        layer
            .borrow()
            .update_uniforms(projection, view, point_lights, camera_position);
        render_window.draw_frame();
    }

    log::info!("rendered {} frames", render_window.frames_rendered());
}
