/// Reports an approximate in-memory size in bytes.
///
/// Partitioners sum this over buffered rows to decide when the byte budget of a cycle is
/// reached. Estimates only need to be stable, not exact.
pub trait SizeHint {
    /// Returns the approximate size in bytes of this value.
    fn size_hint(&self) -> usize;
}

impl SizeHint for String {
    fn size_hint(&self) -> usize {
        size_of::<String>() + self.len()
    }
}

impl SizeHint for Vec<u8> {
    fn size_hint(&self) -> usize {
        size_of::<Vec<u8>>() + self.len()
    }
}

macro_rules! impl_fixed_size_hint {
    ($($ty:ty),*) => {
        $(
            impl SizeHint for $ty {
                fn size_hint(&self) -> usize {
                    size_of::<$ty>()
                }
            }
        )*
    };
}

impl_fixed_size_hint!(bool, u8, u16, u32, u64, i8, i16, i32, i64, f32, f64, usize);

impl<A, B> SizeHint for (A, B)
where
    A: SizeHint,
    B: SizeHint,
{
    fn size_hint(&self) -> usize {
        self.0.size_hint() + self.1.size_hint()
    }
}

impl<T> SizeHint for Option<T>
where
    T: SizeHint,
{
    fn size_hint(&self) -> usize {
        match self {
            Some(value) => value.size_hint(),
            None => 0,
        }
    }
}
