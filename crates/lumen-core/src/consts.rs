use std::sync::OnceLock;

/// Minimum number of complex elements in an FFT pass to use Rayon
/// line-level parallelism.
pub const PARALLEL_FFT_THRESHOLD: usize = 65_536;

/// Minimum number of axial planes in a PSF rebuild to use Rayon
/// plane-level parallelism.
pub const PARALLEL_PLANE_THRESHOLD: usize = 4;

/// Storage-order tag: first index varies fastest in memory.
pub const COLUMN_MAJOR: i32 = 1;
/// Storage-order tag: last index varies fastest in memory.
pub const ROW_MAJOR: i32 = 2;
/// Storage-order tag: neither order traverses memory monotonically.
pub const NONSPECIFIC_ORDER: i32 = 0;

/// Native byte order of the FFT primitive, encoded as in the wire
/// conventions of collaborating tools: 0x01020304 = little-endian,
/// 0x04030201 = big-endian, -1 = unknown.
pub const BIG_ENDIAN: i32 = 0x0403_0201;
pub const LITTLE_ENDIAN: i32 = 0x0102_0304;
pub const UNKNOWN_BYTE_ORDER: i32 = -1;

#[cfg(target_endian = "little")]
pub const NATIVE_BYTE_ORDER: i32 = LITTLE_ENDIAN;
#[cfg(target_endian = "big")]
pub const NATIVE_BYTE_ORDER: i32 = BIG_ENDIAN;

static FLOAT_EPSILON: OnceLock<f32> = OnceLock::new();
static DOUBLE_EPSILON: OnceLock<f64> = OnceLock::new();

/// Smallest positive single-precision x such that 1 + x/2 != 1.
pub fn float_epsilon() -> f32 {
    *FLOAT_EPSILON.get_or_init(|| {
        let mut eps = 1.0f32;
        while 1.0 + eps / 2.0 != 1.0 {
            eps /= 2.0;
        }
        eps
    })
}

/// Smallest positive double-precision x such that 1 + x/2 != 1.
pub fn double_epsilon() -> f64 {
    *DOUBLE_EPSILON.get_or_init(|| {
        let mut eps = 1.0f64;
        while 1.0 + eps / 2.0 != 1.0 {
            eps /= 2.0;
        }
        eps
    })
}
