//! Value types that can travel through process variables.

use std::fmt::Debug;

/// A value type usable with accessors.
///
/// Scalars have exactly one element. `Vec<E>` is the array form; its element
/// count is fixed when the accessor is declared.
pub trait UserType: Clone + Default + PartialEq + Debug + Send + Sync + 'static {
    /// Number of elements held by this value.
    fn n_elements(&self) -> usize {
        1
    }

    /// Default value shaped for `n` elements.
    fn with_elements(_n: usize) -> Self {
        Self::default()
    }

    /// True for array types.
    fn is_array() -> bool {
        false
    }
}

macro_rules! scalar_user_types {
    ($($t:ty),* $(,)?) => {
        $(impl UserType for $t {})*
    };
}

scalar_user_types!(i8, i16, i32, i64, u8, u16, u32, u64, f32, f64, bool, String);

impl<E: UserType> UserType for Vec<E> {
    fn n_elements(&self) -> usize {
        self.len()
    }

    fn with_elements(n: usize) -> Self {
        vec![E::default(); n]
    }

    fn is_array() -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_shape() {
        assert_eq!(5i32.n_elements(), 1);
        assert_eq!(<f64 as UserType>::with_elements(1), 0.0);
        assert!(!<String as UserType>::is_array());
    }

    #[test]
    fn array_shape() {
        let v = <Vec<u16> as UserType>::with_elements(4);
        assert_eq!(v, vec![0, 0, 0, 0]);
        assert_eq!(v.n_elements(), 4);
        assert!(<Vec<u16> as UserType>::is_array());
    }
}
