use glam::{Quat, Vec3};
use pretty_assertions::assert_eq;
use test_case::test_case;

use skinning_engine::animation::pose::{are_equal, interpolate, interpolate_poses};
use skinning_engine::animation::{Animation, Pose, TimeWrapMode};
use skinning_engine::math::Transform;
use skinning_engine::EngineError;

const D: f32 = 2.0;

fn key(angle: f32, x: f32) -> Pose {
    vec![
        Transform::IDENTITY,
        Transform::from_scale_rotation_translation(
            Vec3::splat(1.0 + x),
            Quat::from_rotation_z(angle),
            Vec3::new(x, 1.0, 0.0),
        ),
    ]
}

fn two_key_clip() -> (Animation, Pose, Pose) {
    let k0 = key(0.0, 0.0);
    let k1 = key(1.2, 1.0);
    let mut clip = Animation::new("swing");
    // inserted out of order on purpose
    clip.add_key_pose(k1.clone(), D);
    clip.add_key_pose(k0.clone(), 0.0);
    (clip, k0, k1)
}

#[test_case(0.0, 0.0 ; "start")]
#[test_case(2.0 * D, 0.0 ; "after one full cycle")]
#[test_case(D, 1.0 ; "end")]
#[test_case(3.0 * D, 1.0 ; "end of second cycle")]
#[test_case(1.5 * D, 0.5 ; "backward through the middle")]
#[test_case(0.25 * D, 0.25 ; "forward quarter")]
#[test_case(1.75 * D, 0.25 ; "backward quarter")]
fn ping_pong_sampling(time: f32, alpha: f32) {
    let (mut clip, k0, k1) = two_key_clip();
    let expected = interpolate_poses(&k0, &k1, alpha);
    let sampled = clip.get_pose(time).unwrap();
    assert!(are_equal(&sampled, &expected, 1e-5), "t = {} sampled {:?}", time, sampled);
}

#[test_case(TimeWrapMode::Clamp, 1.5 * D, 1.0 ; "clamp holds the last key")]
#[test_case(TimeWrapMode::Repeat, 1.5 * D, 0.5 ; "repeat restarts")]
#[test_case(TimeWrapMode::Repeat, 1.25 * D, 0.25 ; "repeat quarter")]
#[test_case(TimeWrapMode::PingPong, 1.25 * D, 0.75 ; "ping pong quarter")]
fn wrap_modes(mode: TimeWrapMode, time: f32, alpha: f32) {
    let (mut clip, k0, k1) = two_key_clip();
    let expected = interpolate_poses(&k0, &k1, alpha);
    assert!(are_equal(&clip.get_pose_wrapped(time, mode).unwrap(), &expected, 1e-5));
}

#[test_case(0.0)]
#[test_case(1.0)]
#[test_case(1000.0)]
fn single_key_clip_is_constant(time: f32) {
    let pose = key(0.4, 2.0);
    let mut clip = Animation::new("still");
    clip.add_key_pose(pose.clone(), 0.0);
    assert_eq!(clip.get_pose(time).unwrap(), pose);
}

#[test]
fn single_key_after_zero() {
    let pose = key(0.4, 2.0);
    let mut clip = Animation::new("late");
    clip.add_key_pose(pose.clone(), 3.0);
    assert_eq!(clip.get_pose(0.5).unwrap(), pose);
    assert_eq!(clip.get_pose(7.0).unwrap(), pose);
}

#[test]
fn empty_clip_is_an_error() {
    let mut clip = Animation::new("empty");
    assert!(matches!(clip.get_pose(0.0), Err(EngineError::EmptyAnimation)));
}

#[test]
fn normalize_sorts_keys() {
    let (mut clip, _, _) = two_key_clip();
    clip.add_key_pose(key(0.6, 0.5), 1.0);
    clip.normalize();
    assert_eq!(clip.key_times(), vec![0.0, 1.0, D]);
    assert_eq!(clip.time_interval(), Some((0.0, D)));
}

#[test]
fn interpolation_hits_both_ends() {
    let a = Transform::from_scale_rotation_translation(Vec3::new(1.0, 2.0, 1.0), Quat::from_rotation_x(0.3), Vec3::Y);
    let b = Transform::from_scale_rotation_translation(Vec3::ONE, Quat::from_rotation_y(1.1), Vec3::new(4.0, 0.0, -1.0));
    assert!(interpolate(&a, &b, 0.0).abs_diff_eq(a, 1e-5));
    assert!(interpolate(&a, &b, 1.0).abs_diff_eq(b, 1e-5));
}

#[test]
#[should_panic(expected = "incompatible poses")]
fn incompatible_poses_fail_fast() {
    let a = key(0.0, 0.0);
    let b = vec![Transform::IDENTITY];
    interpolate_poses(&a, &b, 0.5);
}
