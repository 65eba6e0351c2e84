/// Implements the arithmetic operator traits for single-field newtypes over a numeric value.
///
/// * `op!(binary Money, Add, add)` implements `Add<Money> for Money`
/// * `op!(inplace Money, AddAssign, add_assign)` implements `AddAssign<Money> for Money`
/// * `op!(unary Money, Neg, neg)` implements `Neg for Money`
#[macro_export]
macro_rules! op {
    (binary $type:ty, $trait:ident, $fn:ident) => {
        impl $trait for $type {
            type Output = Self;

            fn $fn(self, rhs: Self) -> Self::Output {
                Self(self.0.$fn(rhs.0))
            }
        }
    };
    (inplace $type:ty, $trait:ident, $fn:ident) => {
        impl $trait for $type {
            fn $fn(&mut self, rhs: Self) {
                self.0.$fn(rhs.0)
            }
        }
    };
    (unary $type:ty, $trait:ident, $fn:ident) => {
        impl $trait for $type {
            type Output = Self;

            fn $fn(self) -> Self::Output {
                Self(self.0.$fn())
            }
        }
    };
}
