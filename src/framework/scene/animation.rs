use glam::{Quat, Vec3, Vec4};

use super::NodeId;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PathType {
    Translation,
    Rotation,
    Scale,
}

/// 補間の種類。現在はどの種類でも線形補間を行う。<br />
/// Interpolation mode. Every mode is currently blended linearly.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum InterpolationType {
    Linear,
    Step,
    CubicSpline,
}

impl From<gltf::animation::Interpolation> for InterpolationType {
    fn from(interpolation: gltf::animation::Interpolation) -> Self {
        match interpolation {
            gltf::animation::Interpolation::Linear => InterpolationType::Linear,
            gltf::animation::Interpolation::Step => InterpolationType::Step,
            gltf::animation::Interpolation::CubicSpline => InterpolationType::CubicSpline,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct AnimationChannel {
    pub path: PathType,
    pub node: NodeId,
    pub sampler_index: usize,
}

/// キーフレームの時刻と値。三要素の値は`w = 0`で四要素に広げる。<br />
/// Keyframe times and values. Three-component values are widened to four with `w = 0`.
#[derive(Clone, Debug, PartialEq)]
pub struct AnimationSampler {
    pub interpolation: InterpolationType,
    pub inputs: Vec<f32>,
    pub outputs: Vec<Vec4>,
}

/// チャンネルを評価した結果。<br />
/// Result of evaluating a channel.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum ChannelValue {
    Translation(Vec3),
    Rotation(Quat),
    Scale(Vec3),
}

impl AnimationSampler {
    /// 入力の数が出力の数を超えるサンプラーは壊れている。<br />
    /// A sampler with more inputs than outputs is malformed.
    pub fn is_malformed(&self) -> bool {
        self.inputs.len() > self.outputs.len()
    }

    /// `time`を挟む全てのキーフレームの組について補間した値を返す。<br />
    /// 挟む組がない場合は空になる。<br />
    /// Returns the interpolated value for every keyframe pair bracketing `time`.<br />
    /// Empty when no pair brackets it.
    pub fn sample(&self, path: PathType, time: f32) -> Vec<ChannelValue> {
        let mut values = vec![];
        if self.is_malformed() {
            return values;
        }
        for (i, window) in self.inputs.windows(2).enumerate() {
            let (start, end) = (window[0], window[1]);
            if time < start || time > end {
                continue;
            }
            let u = (time - start).max(0.0) / (end - start);
            if !(u <= 1.0) {
                continue;
            }
            let from = self.outputs[i];
            let to = self.outputs[i + 1];
            let value = match path {
                PathType::Translation => ChannelValue::Translation(from.lerp(to, u).truncate()),
                PathType::Scale => ChannelValue::Scale(from.lerp(to, u).truncate()),
                PathType::Rotation => {
                    let q1 = Quat::from_vec4(from);
                    let q2 = Quat::from_vec4(to);
                    ChannelValue::Rotation(q1.slerp(q2, u).normalize())
                }
            };
            values.push(value);
        }
        values
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Animation {
    pub name: String,
    pub samplers: Vec<AnimationSampler>,
    pub channels: Vec<AnimationChannel>,
    pub start: f32,
    pub end: f32,
}

impl Animation {
    pub fn new(name: String) -> Self {
        Animation {
            name,
            samplers: vec![],
            channels: vec![],
            start: f32::MAX,
            end: f32::MIN,
        }
    }

    /// サンプラーの入力から開始と終了の時刻を広げる。<br />
    /// Widens the start and end bounds with a sampler's inputs.
    pub fn include_inputs(&mut self, inputs: &[f32]) {
        for input in inputs.iter() {
            self.start = self.start.min(*input);
            self.end = self.end.max(*input);
        }
    }

    /// 時刻をアニメーションの範囲に折り返す。<br />
    /// Wraps a time value into the animation's range.
    pub fn wrap_time(&self, time: f32) -> f32 {
        let length = self.end - self.start;
        if length <= 0.0 {
            return self.start.max(0.0);
        }
        self.start + (time - self.start).rem_euclid(length)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn translation_sampler() -> AnimationSampler {
        AnimationSampler {
            interpolation: InterpolationType::Linear,
            inputs: vec![0.0, 2.0],
            outputs: vec![Vec4::new(0.0, 0.0, 0.0, 0.0), Vec4::new(2.0, 4.0, 6.0, 0.0)],
        }
    }

    #[test]
    fn midpoint_is_average_of_keyframes() {
        let values = translation_sampler().sample(PathType::Translation, 1.0);
        assert_eq!(values, vec![ChannelValue::Translation(Vec3::new(1.0, 2.0, 3.0))]);
    }

    #[test]
    fn time_outside_keyframes_yields_nothing() {
        let sampler = translation_sampler();
        assert!(sampler.sample(PathType::Translation, -0.5).is_empty());
        assert!(sampler.sample(PathType::Translation, 2.5).is_empty());
    }

    #[test]
    fn step_interpolation_still_blends_linearly() {
        let mut sampler = translation_sampler();
        sampler.interpolation = InterpolationType::Step;
        let values = sampler.sample(PathType::Scale, 0.5);
        assert_eq!(values, vec![ChannelValue::Scale(Vec3::new(0.5, 1.0, 1.5))]);
    }

    #[test]
    fn rotation_is_normalized_slerp() {
        let sampler = AnimationSampler {
            interpolation: InterpolationType::Linear,
            inputs: vec![0.0, 1.0],
            outputs: vec![
                Vec4::from(Quat::IDENTITY),
                Vec4::from(Quat::from_rotation_y(std::f32::consts::FRAC_PI_2)),
            ],
        };
        match sampler.sample(PathType::Rotation, 0.5).as_slice() {
            [ChannelValue::Rotation(q)] => {
                let expected = Quat::from_rotation_y(std::f32::consts::FRAC_PI_4);
                assert!(q.abs_diff_eq(expected, 1e-5));
                assert!((q.length() - 1.0).abs() < 1e-5);
            }
            other => panic!("unexpected values: {:?}", other),
        }
    }

    #[test]
    fn malformed_sampler_is_skipped() {
        let sampler = AnimationSampler {
            interpolation: InterpolationType::Linear,
            inputs: vec![0.0, 1.0, 2.0],
            outputs: vec![Vec4::ZERO, Vec4::ONE],
        };
        assert!(sampler.is_malformed());
        assert!(sampler.sample(PathType::Translation, 0.5).is_empty());
    }

    #[test]
    fn zero_length_interval_is_skipped() {
        let sampler = AnimationSampler {
            interpolation: InterpolationType::Linear,
            inputs: vec![0.0, 1.0, 1.0, 2.0],
            outputs: vec![Vec4::ZERO, Vec4::ONE, Vec4::splat(2.0), Vec4::splat(3.0)],
        };
        let values = sampler.sample(PathType::Translation, 1.0);
        assert_eq!(
            values,
            vec![
                ChannelValue::Translation(Vec3::ONE),
                ChannelValue::Translation(Vec3::splat(3.0)),
            ]
        );
        assert!(values.iter().all(|value| match value {
            ChannelValue::Translation(v) => !v.is_nan(),
            _ => false,
        }));
    }

    #[test]
    fn bounds_and_wrapping() {
        let mut animation = Animation::new("walk".to_string());
        animation.include_inputs(&[0.5, 1.0, 2.5]);
        assert_eq!((animation.start, animation.end), (0.5, 2.5));
        assert!((animation.wrap_time(3.0) - 1.0).abs() < 1e-6);
        assert!((animation.wrap_time(1.5) - 1.5).abs() < 1e-6);
    }
}
