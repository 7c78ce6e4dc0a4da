//! Integration tests for image decoding and mesh data.

use std::io::Cursor;
use std::path::Path;

use subpass_resources::{ImageData, MeshData, ResourceError, TextureRef, reference_quads};

fn encode_png(width: u32, height: u32, pixels: &[u8]) -> Vec<u8> {
    let img = image::RgbaImage::from_raw(width, height, pixels.to_vec())
        .expect("pixel buffer matches dimensions");
    let mut bytes = Cursor::new(Vec::new());
    img.write_to(&mut bytes, image::ImageFormat::Png)
        .expect("PNG encoding");
    bytes.into_inner()
}

#[test]
fn test_png_decodes_to_identical_rgba8() {
    let pixels: Vec<u8> = (0..4 * 3 * 4).map(|i| (i * 7) as u8).collect();
    let png = encode_png(4, 3, &pixels);

    let data = ImageData::decode(&png).expect("decode PNG");
    assert_eq!((data.width(), data.height()), (4, 3));
    assert_eq!(data.pixels(), pixels.as_slice());
}

#[test]
fn test_load_from_file() {
    let pixels = [10u8, 20, 30, 255, 40, 50, 60, 128];
    let png = encode_png(2, 1, &pixels);
    let path = std::env::temp_dir().join(format!("subpass_resources_{}.png", std::process::id()));
    std::fs::write(&path, png).expect("write temp PNG");

    let data = ImageData::load(&path);
    let _ = std::fs::remove_file(&path);

    let data = data.expect("load PNG");
    assert_eq!(data.pixels(), &pixels);
}

#[test]
fn test_missing_file() {
    let result = ImageData::load(Path::new("definitely/not/here.png"));
    assert!(matches!(result, Err(ResourceError::FileNotFound(_))));
}

#[test]
fn test_reference_scene_matches_two_quads() {
    let quads = reference_quads();
    assert_eq!(quads.len(), 2);

    let total_vertices: usize = quads.iter().map(|m| m.vertices.len()).sum();
    let total_indices: usize = quads.iter().map(|m| m.indices.len()).sum();
    assert_eq!(total_vertices, 8);
    assert_eq!(total_indices, 12);

    for mesh in &quads {
        assert!(mesh.indices.iter().all(|&i| (i as usize) < mesh.vertices.len()));
    }
}

#[test]
fn test_textured_mesh_keeps_reference() {
    let checker = ImageData::from_rgba8(2, 2, vec![255, 0, 0, 255, 0, 0, 0, 255, 0, 0, 0, 255, 255, 0, 0, 255])
        .expect("2x2 image");
    let [quad, _] = reference_quads();
    let mesh: MeshData = quad.with_texture(TextureRef::new("checker", checker.clone()));

    let texture = mesh.texture.expect("texture set");
    assert_eq!(texture.name, "checker");
    assert_eq!(texture.image, checker);
}
