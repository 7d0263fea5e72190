//! # 裁剪模块
//!
//! 验证码控件只展示背景图中与拼图相关的横向条带，对整幅图做匹配既慢又容易被条带外的
//! 内容干扰。匹配前先按 `CropRegion` 提取该条带。

use image::imageops;

use super::{CaptchaError, CropRegion, RasterImage};

/// 从背景图中提取裁剪区域，返回尺寸恰为 `width x height` 的新图像。
///
/// 区域越界时返回 `RegionOutOfBounds`，不做任何收敛。
pub fn crop_to_region(
    background: &RasterImage,
    region: CropRegion,
) -> Result<RasterImage, CaptchaError> {
    let (image_width, image_height) = background.dimensions();

    let fits_horizontally = region
        .left
        .checked_add(region.width)
        .is_some_and(|right| right <= image_width);
    let fits_vertically = region
        .top
        .checked_add(region.height)
        .is_some_and(|bottom| bottom <= image_height);

    if region.width == 0 || region.height == 0 || !fits_horizontally || !fits_vertically {
        return Err(CaptchaError::RegionOutOfBounds {
            top: region.top as i64,
            height: region.height as i64,
            image_width,
            image_height,
        });
    }

    let cropped = imageops::crop_imm(
        background.pixels(),
        region.left,
        region.top,
        region.width,
        region.height,
    )
    .to_image();

    log::debug!(
        "✂️ 裁剪完成 - 来源: {} 区域: left={} top={} {}x{}",
        background.origin(),
        region.left,
        region.top,
        region.width,
        region.height
    );

    RasterImage::new(
        cropped,
        format!("{}#crop({},{})", background.origin(), region.top, region.height),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn gradient(width: u32, height: u32) -> RasterImage {
        let pixels = RgbImage::from_fn(width, height, |x, y| Rgb([x as u8, y as u8, 0]));
        RasterImage::new(pixels, "gradient").expect("non-empty image")
    }

    #[test]
    fn crop_returns_exact_region_contents() {
        let background = gradient(40, 30);
        let region = CropRegion { left: 0, top: 10, width: 40, height: 5 };

        let cropped = crop_to_region(&background, region).expect("region fits");

        assert_eq!(cropped.dimensions(), (40, 5));
        assert_eq!(cropped.pixels().get_pixel(3, 0), &Rgb([3, 10, 0]));
        assert_eq!(cropped.pixels().get_pixel(39, 4), &Rgb([39, 14, 0]));
    }

    #[test]
    fn crop_rejects_region_past_bottom() {
        let background = gradient(40, 30);
        let region = CropRegion { left: 0, top: 26, width: 40, height: 5 };

        assert!(matches!(
            crop_to_region(&background, region),
            Err(CaptchaError::RegionOutOfBounds { top: 26, height: 5, image_height: 30, .. })
        ));
    }

    #[test]
    fn crop_rejects_empty_region() {
        let background = gradient(40, 30);
        let region = CropRegion { left: 0, top: 0, width: 40, height: 0 };
        assert!(crop_to_region(&background, region).is_err());
    }
}
