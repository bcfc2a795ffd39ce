//! End-to-end filter tests.

use std::sync::Arc;

use approx::assert_relative_eq;
use denoise_compute::{reference_library, CpuNetworkBuilder, MemoryCost, NetworkConstants, Weights};
use denoise_core::{Buffer, Error, ErrorKind, Format, Image};
use denoise_filter::{Device, DeviceConfig, Filter, FilterState};
use denoise_transfer::autoexposure;

/// Deterministic pseudo-random RGB in `[0, scale)`.
fn noise_image(w: usize, h: usize, seed: u32, scale: f32) -> Image {
    let mut state = seed | 1;
    let data: Vec<f32> = (0..w * h * 3)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            (state % 1000) as f32 / 1000.0 * scale
        })
        .collect();
    Image::from_rgb(&data, w, h).unwrap()
}

fn copy(image: &Image) -> Image {
    let (w, h) = image.dimensions();
    Image::from_rgb(&image.to_rgb_vec(), w, h).unwrap()
}

/// Device whose network has an 8 pixel overlap and about 1600 pixels per MB,
/// so small images split into many tiles.
fn small_tile_device() -> Device {
    let builder = CpuNetworkBuilder::new(NetworkConstants::new(8, 16), MemoryCost::new(0, 655));
    Device::with_config(
        Arc::new(builder),
        reference_library().unwrap(),
        DeviceConfig {
            num_threads: 0,
            verbose: 0,
            max_memory_mb: 2000,
        },
    )
    .unwrap()
}

fn run(filter: &mut Filter) -> Vec<f32> {
    filter.commit().unwrap();
    filter.execute().unwrap();
    filter.get_image("output").unwrap().unwrap().to_rgb_vec()
}

fn assert_images_eq(a: &[f32], b: &[f32]) {
    assert_eq!(a.len(), b.len());
    for (i, (x, y)) in a.iter().zip(b).enumerate() {
        assert!((x - y).abs() <= 1e-5 * x.abs().max(1.0), "pixel value {i}: {x} vs {y}");
    }
}

#[test]
fn test_512_layout_under_138_mb() {
    let device = Device::cpu().unwrap();
    let mut filter = device.new_filter("RT").unwrap();
    filter.set_color(Image::alloc(Format::Float3, 512, 512).unwrap()).unwrap();
    filter.set_output(Image::alloc(Format::Float3, 512, 512).unwrap()).unwrap();
    filter.set_max_memory_mb(138).unwrap();
    filter.commit().unwrap();

    let layout = filter.tile_layout().unwrap();
    assert_eq!((layout.tile_h, layout.tile_w), (352, 352));
    assert_eq!((layout.count_h, layout.count_w), (2, 2));
    assert_eq!(filter.get_int("overlap").unwrap(), 96);
    assert_eq!(filter.get_int("alignment").unwrap(), 16);
}

#[test]
fn test_tiling_is_transparent_at_512() {
    let device = Device::cpu().unwrap();
    let color = noise_image(512, 512, 7, 4.0);

    let mut whole = device.new_filter("RT").unwrap();
    whole.set_color(color.clone()).unwrap();
    whole.set_output(Image::alloc(Format::Float3, 512, 512).unwrap()).unwrap();
    whole.set_hdr(true).unwrap();
    let expected = run(&mut whole);
    assert!(whole.tile_layout().unwrap().is_single());

    let mut tiled = device.new_filter("RT").unwrap();
    tiled.set_color(color).unwrap();
    tiled.set_output(Image::alloc(Format::Float3, 512, 512).unwrap()).unwrap();
    tiled.set_hdr(true).unwrap();
    tiled.set_max_memory_mb(138).unwrap();
    let actual = run(&mut tiled);
    assert_eq!(tiled.tile_layout().unwrap().count(), 4);

    assert_images_eq(&expected, &actual);
}

#[test]
fn test_tiling_is_transparent_with_aux_images() {
    let device = small_tile_device();
    let (w, h) = (90, 70);
    let color = noise_image(w, h, 3, 1.0);
    let albedo = noise_image(w, h, 5, 1.0);
    let normal = noise_image(w, h, 9, 2.0);

    let mut outputs = Vec::new();
    for max_mb in [2000, 1] {
        let mut filter = device.new_filter("RT").unwrap();
        filter.set_color(color.clone()).unwrap();
        filter.set_albedo(albedo.clone()).unwrap();
        filter.set_normal(normal.clone()).unwrap();
        filter.set_output(Image::alloc(Format::Float3, w, h).unwrap()).unwrap();
        filter.set_max_memory_mb(max_mb).unwrap();
        outputs.push(run(&mut filter));
        if max_mb == 1 {
            assert!(filter.tile_layout().unwrap().count() > 4);
        }
    }
    assert_images_eq(&outputs[0], &outputs[1]);
}

#[test]
fn test_inplace_matches_separate_output() {
    let device = small_tile_device();
    let (w, h) = (75, 61);
    let color = noise_image(w, h, 11, 1.0);

    let mut separate = device.new_filter("RT").unwrap();
    separate.set_color(copy(&color)).unwrap();
    separate.set_output(Image::alloc(Format::Float3, w, h).unwrap()).unwrap();
    separate.set_max_memory_mb(1).unwrap();
    let expected = run(&mut separate);
    assert_eq!(separate.is_inplace(), Some(false));

    let mut inplace = device.new_filter("RT").unwrap();
    inplace.set_color(color.clone()).unwrap();
    inplace.set_output(color.clone()).unwrap();
    inplace.set_max_memory_mb(1).unwrap();
    inplace.commit().unwrap();
    assert_eq!(inplace.is_inplace(), Some(true));
    assert!(inplace.tile_layout().unwrap().count() > 1);
    inplace.execute().unwrap();

    assert_images_eq(&expected, &color.to_rgb_vec());
}

/// Copies the pixels of `src` into `dst`.
fn fill(dst: &Image, src: &Image) {
    let (w, h) = src.dimensions();
    let rgb = src.to_rgb_vec();
    let mut writer = dst.write();
    for y in 0..h {
        for x in 0..w {
            let i = (y * w + x) * 3;
            writer.set3(x, y, [rgb[i], rgb[i + 1], rgb[i + 2]]);
        }
    }
}

fn denoise_separately(device: &Device, color: &Image, albedo: Option<&Image>) -> Vec<f32> {
    let (w, h) = color.dimensions();
    let mut filter = device.new_filter("RT").unwrap();
    filter.set_color(copy(color)).unwrap();
    if let Some(albedo) = albedo {
        filter.set_albedo(copy(albedo)).unwrap();
    }
    filter.set_output(Image::alloc(Format::Float3, w, h).unwrap()).unwrap();
    filter.set_max_memory_mb(1).unwrap();
    run(&mut filter)
}

#[test]
fn test_inplace_with_shifted_output_view() {
    let device = small_tile_device();
    let (w, h, shift) = (40, 160, 32);
    let source = noise_image(w, h, 23, 1.0);
    let expected = denoise_separately(&device, &source, None);

    // Output starts `shift` rows into the color view of the same buffer
    let row_bytes = w * Format::Float3.byte_size();
    let buffer = Buffer::new((h + shift) * row_bytes).unwrap();
    let color = Image::new(buffer.clone(), Format::Float3, w, h, 0, 0, 0).unwrap();
    let output = Image::new(buffer, Format::Float3, w, h, shift * row_bytes, 0, 0).unwrap();
    fill(&color, &source);

    let mut filter = device.new_filter("RT").unwrap();
    filter.set_color(color).unwrap();
    filter.set_output(output.clone()).unwrap();
    filter.set_max_memory_mb(1).unwrap();
    filter.commit().unwrap();
    assert_eq!(filter.is_inplace(), Some(true));
    assert!(filter.tile_layout().unwrap().count() > 1);
    filter.execute().unwrap();

    assert_images_eq(&expected, &output.to_rgb_vec());
}

#[test]
fn test_inplace_over_albedo() {
    let device = small_tile_device();
    let (w, h) = (70, 66);
    let color = noise_image(w, h, 29, 1.0);
    let albedo = noise_image(w, h, 31, 1.0);
    let expected = denoise_separately(&device, &color, Some(&albedo));

    let mut filter = device.new_filter("RT").unwrap();
    filter.set_color(color).unwrap();
    filter.set_albedo(albedo.clone()).unwrap();
    filter.set_output(albedo.clone()).unwrap();
    filter.set_max_memory_mb(1).unwrap();
    filter.commit().unwrap();
    assert_eq!(filter.is_inplace(), Some(true));
    assert!(filter.tile_layout().unwrap().count() > 1);
    filter.execute().unwrap();

    assert_images_eq(&expected, &albedo.to_rgb_vec());
}

#[test]
fn test_inplace_over_shifted_albedo() {
    let device = small_tile_device();
    let (w, h, shift) = (48, 90, 5);
    let color = noise_image(w, h, 37, 1.0);
    let albedo_source = noise_image(w, h, 41, 1.0);
    let expected = denoise_separately(&device, &color, Some(&albedo_source));

    let row_bytes = w * Format::Float3.byte_size();
    let buffer = Buffer::new((h + shift) * row_bytes).unwrap();
    let albedo = Image::new(buffer.clone(), Format::Float3, w, h, shift * row_bytes, 0, 0).unwrap();
    let output = Image::new(buffer, Format::Float3, w, h, 0, 0, 0).unwrap();
    fill(&albedo, &albedo_source);

    let mut filter = device.new_filter("RT").unwrap();
    filter.set_color(color).unwrap();
    filter.set_albedo(albedo).unwrap();
    filter.set_output(output.clone()).unwrap();
    filter.set_max_memory_mb(1).unwrap();
    let _ = run(&mut filter);
    assert_eq!(filter.is_inplace(), Some(true));

    assert_images_eq(&expected, &output.to_rgb_vec());
}

#[test]
fn test_clean_aux_is_stored_but_does_not_change_output() {
    let device = Device::cpu().unwrap();
    let (w, h) = (32, 24);
    let color = noise_image(w, h, 43, 1.0);
    let albedo = noise_image(w, h, 47, 1.0);

    let mut outputs = Vec::new();
    for clean_aux in [false, true] {
        let mut filter = device.new_filter("RT").unwrap();
        filter.set_color(color.clone()).unwrap();
        filter.set_albedo(albedo.clone()).unwrap();
        filter.set_output(Image::alloc(Format::Float3, w, h).unwrap()).unwrap();
        filter.set_clean_aux(clean_aux).unwrap();
        assert_eq!(filter.get_bool("cleanAux").unwrap(), clean_aux);
        outputs.push(run(&mut filter));
    }
    assert_eq!(outputs[0], outputs[1]);
}

#[test]
fn test_inplace_staging_over_budget_still_commits() {
    // 1 MB holds the tiles but not the full-image staging on top
    let device = small_tile_device();
    let (w, h) = (200, 200);
    let color = noise_image(w, h, 53, 1.0);
    let expected = denoise_separately(&device, &color, None);

    let mut filter = device.new_filter("RT").unwrap();
    filter.set_color(color.clone()).unwrap();
    filter.set_output(color.clone()).unwrap();
    filter.set_max_memory_mb(1).unwrap();
    run(&mut filter);
    assert_eq!(filter.is_inplace(), Some(true));
    assert_images_eq(&expected, &color.to_rgb_vec());
}

#[test]
fn test_commit_is_idempotent() {
    let device = Device::cpu().unwrap();
    let mut filter = device.new_filter("RT").unwrap();
    filter.set_color(noise_image(40, 30, 1, 1.0)).unwrap();
    filter.set_output(Image::alloc(Format::Float3, 40, 30).unwrap()).unwrap();

    filter.commit().unwrap();
    let layout = *filter.tile_layout().unwrap();
    let weights = filter.committed_weights().unwrap().clone();

    filter.commit().unwrap();
    assert_eq!(filter.state(), FilterState::Committed);
    assert_eq!(*filter.tile_layout().unwrap(), layout);
    assert!(filter.committed_weights().unwrap().ptr_eq(&weights));

    let first = run(&mut filter);
    let second = run(&mut filter);
    assert_eq!(first, second);
}

#[test]
fn test_normal_without_albedo_rejected_even_with_user_weights() {
    let device = Device::cpu().unwrap();
    let mut filter = device.new_filter("RT").unwrap();
    filter.set_color(Image::alloc(Format::Float3, 16, 16).unwrap()).unwrap();
    filter.set_normal(Image::alloc(Format::Float3, 16, 16).unwrap()).unwrap();
    filter.set_output(Image::alloc(Format::Float3, 16, 16).unwrap()).unwrap();
    filter.set_weights(Some(Weights::from_bytes(vec![1, 2, 3]))).unwrap();

    let err = filter.commit().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert_eq!(filter.state(), FilterState::Uncommitted);
}

#[test]
fn test_malformed_user_weights_are_configuration_errors() {
    let device = Device::cpu().unwrap();
    let mut filter = device.new_filter("RT").unwrap();
    filter.set_color(Image::alloc(Format::Float3, 16, 16).unwrap()).unwrap();
    filter.set_output(Image::alloc(Format::Float3, 16, 16).unwrap()).unwrap();
    filter.set_data("weights", Weights::from_bytes(b"not a weight blob".to_vec())).unwrap();

    let err = filter.commit().unwrap_err();
    assert!(matches!(err, Error::InvalidWeights(_)));

    filter.unset("weights").unwrap();
    filter.commit().unwrap();
}

#[test]
fn test_execute_before_commit_leaves_output_untouched() {
    let device = Device::cpu().unwrap();
    let mut filter = device.new_filter("RT").unwrap();
    let output = Image::from_rgb(&[0.5; 16 * 16 * 3], 16, 16).unwrap();
    filter.set_color(noise_image(16, 16, 2, 1.0)).unwrap();
    filter.set_output(output.clone()).unwrap();

    let err = filter.execute().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidOperation);
    assert!(output.to_rgb_vec().iter().all(|&v| v == 0.5));

    // Dirty after a change also blocks execution
    filter.commit().unwrap();
    filter.set_srgb(true).unwrap();
    assert_eq!(filter.state(), FilterState::Dirty);
    assert!(filter.execute().is_err());
    assert!(output.to_rgb_vec().iter().all(|&v| v == 0.5));
}

#[test]
fn test_option_surface_errors() {
    let device = Device::cpu().unwrap();
    let mut filter = device.new_filter("RT").unwrap();

    let err = filter.set_bool("denoiseHarder", true).unwrap_err();
    assert!(matches!(err, Error::UnsupportedOption { .. }));

    let err = filter.set_int("hdr", 1).unwrap_err();
    assert!(matches!(err, Error::TypeMismatch { .. }));
    let err = filter.get_float("maxMemoryMB").unwrap_err();
    assert!(matches!(err, Error::TypeMismatch { .. }));

    let err = filter.set_int("overlap", 4).unwrap_err();
    assert!(err.is_configuration_error());

    let err = filter.unset("hdr").unwrap_err();
    assert!(err.is_configuration_error());
    assert_eq!(filter.state(), FilterState::Uncommitted);
}

#[test]
fn test_scale_options() {
    let device = Device::cpu().unwrap();
    let mut filter = device.new_filter("RT").unwrap();
    assert!(filter.get_float("inputScale").unwrap().is_nan());

    filter.set_float("hdrScale", 2.5).unwrap();
    assert_eq!(filter.get_float("inputScale").unwrap(), 2.5);

    filter.set_input_scale(None).unwrap();
    assert!(filter.get_float("hdrScale").unwrap().is_nan());
}

#[test]
fn test_dimension_mismatch() {
    let device = Device::cpu().unwrap();
    let mut filter = device.new_filter("RT").unwrap();
    filter.set_color(Image::alloc(Format::Float3, 32, 32).unwrap()).unwrap();
    filter.set_albedo(Image::alloc(Format::Float3, 32, 31).unwrap()).unwrap();
    filter.set_output(Image::alloc(Format::Float3, 32, 32).unwrap()).unwrap();

    let err = filter.commit().unwrap_err();
    assert!(matches!(err, Error::DimensionMismatch { .. }));
    assert!(err.is_configuration_error());
}

#[test]
fn test_missing_output() {
    let device = Device::cpu().unwrap();
    let mut filter = device.new_filter("RT").unwrap();
    filter.set_color(Image::alloc(Format::Float3, 8, 8).unwrap()).unwrap();
    assert!(matches!(filter.commit().unwrap_err(), Error::MissingImage("output")));
}

#[test]
fn test_lightmap_option_table() {
    let device = Device::cpu().unwrap();
    let mut filter = device.new_filter("RTLightmap").unwrap();

    let err = filter.set_albedo(Image::alloc(Format::Float3, 8, 8).unwrap()).unwrap_err();
    assert!(matches!(err, Error::UnsupportedOption { .. }));
    assert!(filter.set_hdr(true).is_err());

    filter.set_directional(true).unwrap();
    assert!(filter.get_bool("directional").unwrap());
}

#[test]
fn test_lightmap_directional_runs() {
    let device = Device::cpu().unwrap();
    let mut filter = device.new_filter("RTLightmap").unwrap();
    let color = noise_image(48, 40, 13, 2.0);
    filter.set_color(color).unwrap();
    filter.set_output(Image::alloc(Format::Float3, 48, 40).unwrap()).unwrap();
    filter.set_directional(true).unwrap();

    let out = run(&mut filter);
    assert!(out.iter().all(|v| v.is_finite()));

    filter.set_directional(false).unwrap();
    let log = run(&mut filter);
    assert!(log.iter().all(|v| v.is_finite() && *v >= 0.0));
}

#[test]
fn test_autoexposure_matches_explicit_scale() {
    let device = Device::cpu().unwrap();
    let color = noise_image(64, 48, 17, 20.0);
    let scale = autoexposure(&color);
    assert!(scale > 0.0 && scale < 1.0);

    let mut auto = device.new_filter("RT").unwrap();
    auto.set_color(color.clone()).unwrap();
    auto.set_output(Image::alloc(Format::Float3, 64, 48).unwrap()).unwrap();
    auto.set_hdr(true).unwrap();
    let auto_out = run(&mut auto);

    let mut explicit = device.new_filter("RT").unwrap();
    explicit.set_color(color).unwrap();
    explicit.set_output(Image::alloc(Format::Float3, 64, 48).unwrap()).unwrap();
    explicit.set_hdr(true).unwrap();
    explicit.set_input_scale(Some(scale)).unwrap();
    let explicit_out = run(&mut explicit);

    assert_images_eq(&auto_out, &explicit_out);
}

#[test]
fn test_constant_ldr_image_is_preserved() {
    let device = Device::cpu().unwrap();
    let mut filter = device.new_filter("RT").unwrap();
    filter.set_color(Image::from_rgb(&[0.4; 32 * 32 * 3], 32, 32).unwrap()).unwrap();
    filter.set_output(Image::alloc(Format::Float3, 32, 32).unwrap()).unwrap();
    filter.set_srgb(true).unwrap();

    let out = run(&mut filter);
    // Interior pixels see only the constant; the zero border darkens edges
    let center = (16 * 32 + 16) * 3;
    assert_relative_eq!(out[center], 0.4, epsilon = 1e-4);
}
