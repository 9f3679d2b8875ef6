mod common;

use approx::assert_abs_diff_eq;
use common::{random_vector, space};
use lumen_core::array::Array;
use lumen_core::error::LumenError;
use lumen_core::shape::Shape;
use lumen_core::vector::VectorSpace;

#[test]
fn spaces_compare_by_shape() {
    let a = space(&[4, 3]);
    let b = space(&[4, 3]);
    let c = space(&[3, 4]);
    assert_eq!(a, b);
    assert_ne!(a, c);
    assert_eq!(a.len(), 12);
    assert_eq!(a.rank(), 2);
}

#[test]
fn wrap_validates_the_component_count() {
    let s = space(&[3]);
    assert!(matches!(
        s.wrap(vec![1.0, 2.0]).unwrap_err(),
        LumenError::IncorrectSpace(_)
    ));
}

#[test]
fn operations_reject_foreign_operands() {
    let s = space(&[4]);
    let other = space(&[5]);
    let mut x = s.create();
    let y = random_vector(&other, 1);
    assert!(matches!(
        x.copy_from(&y).unwrap_err(),
        LumenError::IncorrectSpace(_)
    ));
    assert!(matches!(x.dot(&y).unwrap_err(), LumenError::IncorrectSpace(_)));
    assert!(matches!(
        x.multiply(&y).unwrap_err(),
        LumenError::IncorrectSpace(_)
    ));
}

#[test]
fn linear_combination_and_dot() {
    let s = space(&[3]);
    let x = s.wrap(vec![1.0, 2.0, 3.0]).unwrap();
    let y = s.wrap(vec![-1.0, 0.5, 2.0]).unwrap();
    let mut z = s.create();
    z.combine(2.0, &x, 3.0, &y).unwrap();
    assert_eq!(z.as_slice(), &[-1.0, 5.5, 12.0]);

    z.add_scaled(1.0, &x).unwrap();
    assert_eq!(z.as_slice(), &[0.0, 7.5, 15.0]);

    let d = x.dot(&y).unwrap();
    assert!((d - (-1.0 + 1.0 + 6.0)).abs() < 1e-14);
}

#[test]
fn norms_accumulate_in_double_precision() {
    let s = space(&[4]);
    let x = s.wrap(vec![3.0, -4.0, 0.0, 0.0]).unwrap();
    assert_abs_diff_eq!(x.norm2(), 5.0, epsilon = 1e-14);
    assert_abs_diff_eq!(x.norm1(), 7.0, epsilon = 1e-14);
    assert_abs_diff_eq!(x.norm_inf(), 4.0, epsilon = 1e-14);
}

#[test]
fn component_wise_multiply() {
    let s = space(&[3]);
    let mut x = s.wrap(vec![1.0, 2.0, 3.0]).unwrap();
    let y = s.wrap(vec![2.0, 0.5, -1.0]).unwrap();
    x.multiply(&y).unwrap();
    assert_eq!(x.as_slice(), &[2.0, 1.0, -3.0]);
}

#[test]
fn vectors_interchange_with_shaped_arrays() {
    let shape = Shape::new(&[3, 2]).unwrap();
    let s = VectorSpace::<f64>::new(shape.clone()).unwrap();
    let array = Array::from_vec(shape, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
    let v = s.vector_from_array(&array).unwrap();
    assert_eq!(v.as_slice(), &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);

    let back = v.to_array().unwrap();
    assert_eq!(back.get(&[2, 1]).unwrap(), 6.0);

    // converting element types on the way in
    let ints = Array::from_vec(Shape::new(&[3, 2]).unwrap(), vec![1i32, 2, 3, 4, 5, 6]).unwrap();
    let vi = s.vector_from_array(&ints).unwrap();
    assert_eq!(vi.as_slice(), v.as_slice());

    let wrong = Array::<f64>::zeros(Shape::new(&[2, 3]).unwrap()).unwrap();
    assert!(matches!(
        s.vector_from_array(&wrong).unwrap_err(),
        LumenError::ShapeMismatch { .. }
    ));
}

#[test]
fn fill_scale_zero() {
    let s = space(&[4]);
    let mut x = s.create();
    x.fill(2.5);
    x.scale(-2.0);
    assert_eq!(x.as_slice(), &[-5.0; 4]);
    x.zero();
    assert_eq!(x.as_slice(), &[0.0; 4]);
}
