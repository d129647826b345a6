use critique_payload::image_pipeline::{
    CompressionSettings, Compressor, ImageError, PRE_SHRINK_PIXEL_LIMIT, SourceImage, plan_dimensions,
};
use image::{DynamicImage, Rgba, RgbaImage};
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn random_image(width: u32, height: u32, seed: u64, with_alpha: bool) -> SourceImage {
    let mut rng = StdRng::seed_from_u64(seed);
    let img = RgbaImage::from_fn(width, height, |_, _| {
        let alpha = if with_alpha { rng.gen_range(0..=255) } else { 255 };
        Rgba([rng.gen_range(0..=255), rng.gen_range(0..=255), rng.gen_range(0..=255), alpha])
    });
    SourceImage::new(DynamicImage::ImageRgba8(img), "proptest")
}

proptest! {
    #[test]
    fn planned_dimensions_stay_positive_and_bounded(
        width in 1u32..20_000,
        height in 1u32..20_000,
        max_width in 1u32..4_000,
        max_height in 1u32..4_000,
    ) {
        let target = plan_dimensions(width, height, max_width, max_height);

        prop_assert!(target.width >= 1 && target.height >= 1);
        prop_assert!(target.width <= max_width && target.height <= max_height);
        prop_assert!(target.width <= width && target.height <= height);
        prop_assert_eq!(target.pre_shrunk, width as u64 * height as u64 > PRE_SHRINK_PIXEL_LIMIT);
    }

    #[test]
    fn planned_dimensions_preserve_aspect_ratio(
        width in 1u32..20_000,
        height in 1u32..20_000,
        max_width in 1u32..4_000,
        max_height in 1u32..4_000,
    ) {
        let target = plan_dimensions(width, height, max_width, max_height);

        let skew = (target.width as i128 * height as i128 - target.height as i128 * width as i128).abs();
        let longest = width.max(height) as i128;

        prop_assert!(skew <= longest, "skew {} for {:?}", skew, target);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn successful_payloads_never_exceed_budget(
        width in 1u32..160,
        height in 1u32..160,
        max_size_bytes in 700u64..40_000,
        seed in any::<u64>(),
        with_alpha in any::<bool>(),
        force_opaque_format in any::<bool>(),
    ) {
        let source = random_image(width, height, seed, with_alpha);
        let settings = CompressionSettings {
            max_size_bytes,
            force_opaque_format,
            ..CompressionSettings::default()
        };

        let mut attempts = 0u32;
        let result = Compressor::new(settings.clone())
            .compress_with_hooks(&source, |_| attempts += 1);

        prop_assert!(attempts <= settings.max_attempts + 1);

        match result {
            Ok(payload) => prop_assert!(payload.size() <= max_size_bytes),
            Err(ImageError::CompressionExhausted { last_size, limit, .. }) => {
                prop_assert!(last_size > limit);
                prop_assert_eq!(limit, max_size_bytes);
            }
            Err(other) => prop_assert!(false, "unexpected error: {}", other),
        }
    }
}
