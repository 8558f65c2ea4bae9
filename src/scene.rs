use std::f32::consts::TAU;
use std::ops::RangeInclusive;

use rand::Rng;

use crate::util::color::hsv_to_rgb;

/// Spheres reserved up front; larger counts grow as they are placed.
const RESERVED_SPHERES: u32 = 4096;

/// Flat specular reflectance given to every non-metal sphere.
pub const DIELECTRIC_SPECULAR: f32 = 0.04;

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Scene {
    pub spheres: Vec<Sphere>,
}

impl Scene {
    pub fn len(&self) -> usize {
        self.spheres.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spheres.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Sphere> {
        self.spheres.iter()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sphere {
    pub position: glam::Vec3,
    pub radius: f32,

    pub albedo: glam::Vec3,
    pub specular: glam::Vec3,
}

impl Sphere {
    /// Metals have no diffuse term and carry their color in the specular channel.
    pub fn metal(position: glam::Vec3, radius: f32, color: glam::Vec3) -> Self {
        Self {
            position,
            radius,
            albedo: glam::Vec3::ZERO,
            specular: color,
        }
    }

    pub fn dielectric(position: glam::Vec3, radius: f32, color: glam::Vec3) -> Self {
        Self {
            position,
            radius,
            albedo: color,
            specular: glam::Vec3::splat(DIELECTRIC_SPECULAR),
        }
    }

    fn default_at(position: glam::Vec3, radius: f32) -> Self {
        Self {
            position,
            radius,
            ..Self::default()
        }
    }

    pub fn is_metal(&self) -> bool {
        self.albedo == glam::Vec3::ZERO
    }

    /// True when the two spheres interpenetrate. Touching spheres do not overlap.
    pub fn overlaps(&self, other: &Sphere) -> bool {
        let min_distance = self.radius + other.radius;
        self.position.distance_squared(other.position) < min_distance * min_distance
    }
}

impl Default for Sphere {
    fn default() -> Self {
        Self::dielectric(glam::Vec3::new(0.0, 0.5, 0.0), 0.5, glam::Vec3::ONE)
    }
}

/// Rejection-sampled placement of spheres resting on the ground plane.
///
/// Every attempt that collides with an already accepted sphere is dropped,
/// so a build may return fewer than `max_count` spheres.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneBuilder {
    pub max_count: u32,
    pub radius_range: RangeInclusive<f32>,
    pub placement_radius: f32,
}

impl Default for SceneBuilder {
    fn default() -> Self {
        Self {
            max_count: 100,
            radius_range: 3.0..=8.0,
            placement_radius: 100.0,
        }
    }
}

impl SceneBuilder {
    pub fn new(max_count: u32, radius_range: RangeInclusive<f32>, placement_radius: f32) -> Self {
        Self {
            max_count,
            radius_range,
            placement_radius,
        }
    }

    pub fn build<R: Rng + ?Sized>(&self, rng: &mut R) -> Scene {
        let mut spheres: Vec<Sphere> = Vec::with_capacity(self.reserved_capacity());

        for _ in 0..self.max_count {
            let radius = self.sample_radius(rng);
            let ground = self.sample_disk(rng);
            let position = glam::Vec3::new(ground.x, radius, ground.y);

            let candidate = Sphere::default_at(position, radius);
            if spheres.iter().any(|placed| placed.overlaps(&candidate)) {
                continue;
            }

            // value drawn from (0, 1] so a dielectric albedo is never black
            let color = hsv_to_rgb(rng.gen(), rng.gen(), 1.0 - rng.gen::<f32>());
            let sphere = if rng.gen_bool(0.5) {
                Sphere::metal(position, radius, color)
            } else {
                Sphere::dielectric(position, radius, color)
            };
            spheres.push(sphere);
        }

        if spheres.len() < self.max_count as usize {
            tracing::debug!(
                requested = self.max_count,
                placed = spheres.len(),
                "scene placement fell short"
            );
        }

        Scene { spheres }
    }

    fn reserved_capacity(&self) -> usize {
        self.max_count.min(RESERVED_SPHERES) as usize
    }

    /// Whether the requested sphere count is unlikely to fit in the placement disk.
    ///
    /// Compares the summed footprint of `max_count` minimum-radius spheres
    /// against half of the disk area.
    pub fn crowding_warning(&self) -> bool {
        let min_radius = *self.radius_range.start();
        let footprint = self.max_count as f32 * min_radius * min_radius;
        footprint > 0.5 * self.placement_radius * self.placement_radius
    }

    fn sample_radius<R: Rng + ?Sized>(&self, rng: &mut R) -> f32 {
        let (min, max) = (*self.radius_range.start(), *self.radius_range.end());
        if min >= max {
            min
        } else {
            rng.gen_range(min..=max)
        }
    }

    /// Uniform point inside the placement disk, polar method.
    fn sample_disk<R: Rng + ?Sized>(&self, rng: &mut R) -> glam::Vec2 {
        let distance = self.placement_radius * rng.gen::<f32>().sqrt();
        let angle = rng.gen::<f32>() * TAU;
        glam::Vec2::new(angle.cos(), angle.sin()) * distance
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    fn is_dielectric(sphere: &Sphere) -> bool {
        sphere.specular == glam::Vec3::splat(DIELECTRIC_SPECULAR)
    }

    #[test]
    fn placed_spheres_never_interpenetrate() {
        let builders = [
            SceneBuilder::default(),
            SceneBuilder::new(200, 1.0..=10.0, 30.0),
            SceneBuilder::new(50, 0.5..=0.5, 4.0),
        ];
        for builder in &builders {
            for seed in 0..64 {
                let scene = builder.build(&mut SmallRng::seed_from_u64(seed));
                for (i, a) in scene.iter().enumerate() {
                    for b in scene.spheres[i + 1..].iter() {
                        let distance = a.position.distance(b.position);
                        assert!(
                            distance >= a.radius + b.radius - 1e-4,
                            "seed {seed}: {a:?} overlaps {b:?}"
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn every_sphere_is_either_metal_or_dielectric() {
        for seed in 0..32 {
            let scene = SceneBuilder::default().build(&mut SmallRng::seed_from_u64(seed));
            for sphere in scene.iter() {
                assert!(
                    sphere.is_metal() != is_dielectric(sphere),
                    "seed {seed}: ambiguous material {sphere:?}"
                );
            }
        }
    }

    #[test]
    fn both_materials_show_up() {
        let scene = SceneBuilder::default().build(&mut SmallRng::seed_from_u64(7));
        assert!(scene.iter().any(Sphere::is_metal));
        assert!(scene.iter().any(is_dielectric));
    }

    #[test]
    fn never_exceeds_requested_count() {
        let mut rng = SmallRng::seed_from_u64(3);
        for max_count in [0, 1, 5, 40, 300] {
            let scene = SceneBuilder::new(max_count, 2.0..=6.0, 25.0).build(&mut rng);
            assert!(scene.len() <= max_count as usize);
        }
        assert!(SceneBuilder::new(0, 3.0..=8.0, 100.0)
            .build(&mut rng)
            .is_empty());
    }

    #[test]
    fn spheres_rest_on_the_ground_inside_the_disk() {
        let builder = SceneBuilder::new(80, 1.0..=3.0, 40.0);
        let scene = builder.build(&mut SmallRng::seed_from_u64(11));
        for sphere in scene.iter() {
            assert_eq!(sphere.position.y, sphere.radius);
            assert!(builder.radius_range.contains(&sphere.radius));
            let ground = glam::Vec2::new(sphere.position.x, sphere.position.z);
            assert!(ground.length() <= builder.placement_radius + 1e-3);
        }
    }

    #[test]
    fn same_seed_same_scene() {
        let builder = SceneBuilder::default();
        let a = builder.build(&mut SmallRng::seed_from_u64(99));
        let b = builder.build(&mut SmallRng::seed_from_u64(99));
        assert_eq!(a, b);
    }

    #[test]
    fn dense_configuration_falls_short() {
        // Twenty radius-5 spheres cannot share a disk of radius 5.
        let builder = SceneBuilder::new(20, 5.0..=5.0, 5.0);
        let scene = builder.build(&mut SmallRng::seed_from_u64(1));
        assert!(!scene.is_empty());
        assert!(scene.len() < 20);
        assert!(builder.crowding_warning());
        assert!(!SceneBuilder::default().crowding_warning());
    }

    #[test]
    fn touching_spheres_do_not_overlap() {
        let a = Sphere::default_at(glam::Vec3::ZERO, 1.0);
        let b = Sphere::default_at(glam::Vec3::new(2.0, 0.0, 0.0), 1.0);
        let c = Sphere::default_at(glam::Vec3::new(1.5, 0.0, 0.0), 1.0);
        assert!(!a.overlaps(&b));
        assert!(a.overlaps(&c));
    }

    #[test]
    fn reservation_is_capped() {
        let huge = SceneBuilder {
            max_count: u32::MAX,
            ..SceneBuilder::default()
        };
        assert_eq!(huge.reserved_capacity(), RESERVED_SPHERES as usize);
        assert_eq!(SceneBuilder::default().reserved_capacity(), 100);
    }
}
