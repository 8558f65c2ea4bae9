pub mod math {
    pub fn degree_to_radian(degree: f32) -> f32 {
        degree * std::f32::consts::PI / 180.0
    }

    /// Integer division rounding towards positive infinity.
    #[inline(always)]
    pub fn div_ceil(value: u32, divisor: u32) -> u32 {
        (value + divisor - 1) / divisor
    }
}

pub mod color {
    /// Convert a hue/saturation/value triple (all in `[0, 1]`) to linear RGB.
    pub fn hsv_to_rgb(hue: f32, saturation: f32, value: f32) -> glam::Vec3 {
        if saturation <= 0.0 {
            return glam::Vec3::splat(value);
        }

        let sector = (hue.rem_euclid(1.0)) * 6.0;
        let index = sector.floor();
        let fraction = sector - index;

        let p = value * (1.0 - saturation);
        let q = value * (1.0 - saturation * fraction);
        let t = value * (1.0 - saturation * (1.0 - fraction));

        match index as u32 {
            0 => glam::Vec3::new(value, t, p),
            1 => glam::Vec3::new(q, value, p),
            2 => glam::Vec3::new(p, value, t),
            3 => glam::Vec3::new(p, q, value),
            4 => glam::Vec3::new(t, p, value),
            _ => glam::Vec3::new(value, p, q),
        }
    }
}
