//! 与 GPU 无关的相机数学：TAA jitter、视锥平面、CSM 切分与光源矩阵

use glam::{Mat4, Vec2, Vec3, Vec4, Vec4Swizzles};
use prism_render_interface::gpu_types::{CSM_CASCADE_COUNT, Light};

/// shadow map 的边长，texel snapping 也依赖这个值
pub const SHADOW_MAP_SIZE: u32 = 4096;

/// Halton 序列的周期
pub const JITTER_PERIOD: u64 = 16;

/// Halton 低差异序列的第 `index` 项
pub fn halton(mut index: u32, base: u32) -> f32 {
    let mut f = 1.0;
    let mut r = 0.0;
    while index > 0 {
        f /= base as f32;
        r += f * (index % base) as f32;
        index /= base;
    }
    r
}

/// 第 `frame_index` 帧的亚像素偏移，x 使用 base 2，y 使用 base 3，以 16 帧为周期
pub fn taa_jitter(frame_index: u64, width: f32, height: f32) -> Vec2 {
    let i = (frame_index % JITTER_PERIOD) as u32 + 1;
    Vec2::new((halton(i, 2) - 0.5) / width, (halton(i, 3) - 0.5) / height)
}

/// 将 jitter 写入投影矩阵的第 3 列（`proj[2][0]`、`proj[2][1]`）
pub fn apply_jitter(mut projection: Mat4, jitter: Vec2) -> Mat4 {
    projection.z_axis.x += jitter.x;
    projection.z_axis.y += jitter.y;
    projection
}

/// 从 view-projection 的行向量中提取 6 个视锥平面，顺序为 left/right/bottom/top/near/far
///
/// 平面的 xyz 被归一化，点 P 在视锥内侧满足 `dot(plane.xyz, P) + plane.w >= 0`
pub fn frustum_planes(view_projection: Mat4) -> [Vec4; 6] {
    let r0 = view_projection.row(0);
    let r1 = view_projection.row(1);
    let r2 = view_projection.row(2);
    let r3 = view_projection.row(3);

    [r3 + r0, r3 - r0, r3 + r1, r3 - r1, r3 + r2, r3 - r2].map(|plane| {
        let len = plane.xyz().length();
        if len > f32::EPSILON { plane / len } else { plane }
    })
}

/// CSM 的切分距离：对数切分与均匀切分按 lambda 混合
///
/// 返回 4 个 cascade 的远端距离，最后一个等于 `far`
pub fn cascade_splits(near: f32, far: f32, lambda: f32) -> [f32; CSM_CASCADE_COUNT] {
    let ratio = far / near;
    std::array::from_fn(|i| {
        let p = (i + 1) as f32 / CSM_CASCADE_COUNT as f32;
        let log = near * ratio.powf(p);
        let uniform = near + (far - near) * p;
        lambda * (log - uniform) + uniform
    })
}

/// 某个 cascade 覆盖的 8 个世界空间角点
///
/// 先把 NDC 立方体（Vulkan 深度 0..1）反投影到世界空间，再沿每条侧棱按
/// `[split_near, split_far] / far` 截取
pub fn cascade_corners(inverse_view_projection: Mat4, split_near: f32, split_far: f32, far: f32) -> [Vec3; 8] {
    const NDC: [Vec3; 8] = [
        Vec3::new(-1.0, 1.0, 0.0),
        Vec3::new(1.0, 1.0, 0.0),
        Vec3::new(1.0, -1.0, 0.0),
        Vec3::new(-1.0, -1.0, 0.0),
        Vec3::new(-1.0, 1.0, 1.0),
        Vec3::new(1.0, 1.0, 1.0),
        Vec3::new(1.0, -1.0, 1.0),
        Vec3::new(-1.0, -1.0, 1.0),
    ];

    let mut corners = NDC.map(|c| inverse_view_projection.project_point3(c));
    for j in 0..4 {
        let edge = corners[j + 4] - corners[j];
        corners[j + 4] = corners[j] + edge * (split_far / far);
        corners[j] += edge * (split_near / far);
    }
    corners
}

/// 包围 cascade 的正交光源矩阵
///
/// 用球包围角点，使矩阵不随相机旋转而变化；光源空间原点对齐到 shadow map texel，消除移动时的闪烁
pub fn cascade_view_projection(corners: &[Vec3; 8], light_dir: Vec3) -> Mat4 {
    let center = corners.iter().copied().sum::<Vec3>() / 8.0;
    let radius = corners.iter().map(|c| c.distance(center)).fold(0.0_f32, f32::max);
    let radius = (radius * 16.0).ceil() / 16.0;

    let up = if light_dir.normalize().dot(Vec3::Y).abs() > 0.99 { Vec3::Z } else { Vec3::Y };
    let light_view = Mat4::look_at_rh(center - light_dir * radius, center, up);
    let mut light_ortho = Mat4::orthographic_rh(-radius, radius, -radius, radius, 0.0, 2.0 * radius);

    let half_size = SHADOW_MAP_SIZE as f32 / 2.0;
    let origin = (light_ortho * light_view * Vec4::W).xy() * half_size;
    let offset = (origin.round() - origin) / half_size;
    light_ortho.w_axis.x += offset.x;
    light_ortho.w_axis.y += offset.y;
    light_ortho.y_axis.y *= -1.0;

    light_ortho * light_view
}

/// 为所有 cascade 计算光源矩阵，`view_projection` 不能带 jitter
pub fn cascade_view_projections(
    view_projection: Mat4,
    near: f32,
    far: f32,
    splits: &[f32; CSM_CASCADE_COUNT],
    light_dir: Vec3,
) -> [Mat4; CSM_CASCADE_COUNT] {
    let inverse = view_projection.inverse();
    let mut last_split = near;
    std::array::from_fn(|i| {
        let corners = cascade_corners(inverse, last_split, splits[i], far);
        last_split = splits[i];
        cascade_view_projection(&corners, light_dir)
    })
}

/// 投射阴影的光源方向：第一个光源为方向光时取其方向，为点光源时从光源指向原点
pub fn shadow_light_direction(lights: &[Light]) -> Vec3 {
    let Some(first) = lights.first() else {
        return Vec3::splat(-1.0).normalize();
    };
    let dir = if first.is_directional() { first.direction.xyz() } else { -first.position.xyz() };
    dir.try_normalize().unwrap_or(Vec3::NEG_Y)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_camera() -> (Mat4, Mat4) {
        let view = Mat4::look_at_rh(Vec3::new(0.0, 1.0, 5.0), Vec3::ZERO, Vec3::Y);
        let mut proj = Mat4::perspective_rh(45_f32.to_radians(), 16.0 / 9.0, 0.1, 1000.0);
        proj.y_axis.y *= -1.0;
        (view, proj)
    }

    #[test]
    fn halton_matches_known_values() {
        assert_eq!(halton(1, 2), 0.5);
        assert_eq!(halton(2, 2), 0.25);
        assert_eq!(halton(3, 2), 0.75);
        assert!((halton(1, 3) - 1.0 / 3.0).abs() < 1e-6);
        assert!((halton(2, 3) - 2.0 / 3.0).abs() < 1e-6);
        assert_eq!(halton(0, 2), 0.0);
    }

    #[test]
    fn jitter_repeats_every_period_and_stays_sub_pixel() {
        for frame in 0..JITTER_PERIOD {
            let j = taa_jitter(frame, 1600.0, 900.0);
            assert_eq!(j, taa_jitter(frame + JITTER_PERIOD, 1600.0, 900.0));
            assert!(j.x.abs() <= 0.5 / 1600.0);
            assert!(j.y.abs() <= 0.5 / 900.0);
        }
        assert_ne!(taa_jitter(0, 1600.0, 900.0), taa_jitter(1, 1600.0, 900.0));
    }

    #[test]
    fn jitter_only_touches_third_column() {
        let (_, proj) = test_camera();
        let jittered = apply_jitter(proj, Vec2::new(0.01, -0.02));
        assert_eq!(jittered.x_axis, proj.x_axis);
        assert_eq!(jittered.w_axis, proj.w_axis);
        assert!((jittered.z_axis.x - proj.z_axis.x - 0.01).abs() < 1e-7);
        assert!((jittered.z_axis.y - proj.z_axis.y + 0.02).abs() < 1e-7);
    }

    #[test]
    fn frustum_planes_are_normalized_and_contain_points_in_view() {
        let (view, proj) = test_camera();
        let planes = frustum_planes(proj * view);
        for plane in planes {
            assert!((plane.xyz().length() - 1.0).abs() < 1e-4);
        }

        let camera = Vec3::new(0.0, 1.0, 5.0);
        // 相机位置位于四个侧面与远平面的内侧
        for plane in planes.iter().take(4).chain(std::iter::once(&planes[5])) {
            assert!(plane.xyz().dot(camera) + plane.w >= -1e-3);
        }
        let ahead = camera + (Vec3::ZERO - camera).normalize() * 2.0;
        for plane in planes {
            assert!(plane.xyz().dot(ahead) + plane.w >= 0.0);
        }
        let behind = camera - (Vec3::ZERO - camera).normalize() * 2.0;
        assert!(planes.iter().any(|p| p.xyz().dot(behind) + p.w < 0.0));
    }

    #[test]
    fn cascade_splits_are_monotonic_and_end_at_far() {
        for lambda in [0.0, 0.5, 0.95, 1.0] {
            let splits = cascade_splits(0.1, 1000.0, lambda);
            assert!(splits[0] > 0.1);
            assert!(splits.windows(2).all(|w| w[0] < w[1]));
            assert!((splits[3] - 1000.0).abs() < 1e-2);
        }
        // lambda = 0 时为均匀切分
        let uniform = cascade_splits(1.0, 101.0, 0.0);
        assert!((uniform[0] - 26.0).abs() < 1e-4);
    }

    #[test]
    fn cascade_contains_all_of_its_corners() {
        let (view, proj) = test_camera();
        let vp = proj * view;
        let splits = cascade_splits(0.1, 1000.0, 0.95);
        let light_dir = Vec3::new(-1.0, -1.0, -1.0).normalize();
        let matrices = cascade_view_projections(vp, 0.1, 1000.0, &splits, light_dir);

        let inverse = vp.inverse();
        let mut last = 0.1;
        for (i, m) in matrices.iter().enumerate() {
            let corners = cascade_corners(inverse, last, splits[i], 1000.0);
            last = splits[i];
            for c in corners {
                let p = m.project_point3(c);
                assert!(p.x.abs() <= 1.0 + 1e-2, "cascade {i}: x = {}", p.x);
                assert!(p.y.abs() <= 1.0 + 1e-2, "cascade {i}: y = {}", p.y);
                assert!((-1e-2..=1.0 + 1e-2).contains(&p.z), "cascade {i}: z = {}", p.z);
            }
        }
    }

    #[test]
    fn vertical_light_does_not_produce_nan() {
        let (view, proj) = test_camera();
        let splits = cascade_splits(0.1, 100.0, 0.5);
        let matrices = cascade_view_projections(proj * view, 0.1, 100.0, &splits, Vec3::NEG_Y);
        assert!(matrices.iter().all(|m| !m.is_nan()));
    }

    #[test]
    fn shadow_direction_from_lights() {
        assert!((shadow_light_direction(&[]) - Vec3::splat(-1.0).normalize()).length() < 1e-6);

        let sun = Light {
            position: Vec4::new(5.0, 8.0, 5.0, 1.0),
            direction: Vec4::new(0.0, -2.0, 0.0, 20.0),
            ..Default::default()
        };
        assert_eq!(shadow_light_direction(&[sun]), Vec3::NEG_Y);

        let point = Light {
            position: Vec4::new(0.0, 4.0, 0.0, 0.0),
            ..Default::default()
        };
        assert_eq!(shadow_light_direction(&[point]), Vec3::NEG_Y);
    }
}
