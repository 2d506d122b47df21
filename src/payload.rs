//! A minimal owned N-dimensional numeric array. Regridding/interpolation
//! kernels are out of scope; this type only needs to support shape
//! validation, element-wise scaling, and element-wise combination, which
//! is all the adapters in this crate require.

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Payload {
    shape: Vec<usize>,
    data: Vec<f64>,
}

impl Payload {
    pub fn new(shape: Vec<usize>, data: Vec<f64>) -> Self {
        let expected: usize = shape.iter().product();
        assert_eq!(
            expected,
            data.len(),
            "payload data length must match shape product"
        );
        Payload { shape, data }
    }

    pub fn scalar(value: f64) -> Self {
        Payload {
            shape: vec![],
            data: vec![value],
        }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    pub fn as_scalar(&self) -> Option<f64> {
        if self.data.len() == 1 {
            Some(self.data[0])
        } else {
            None
        }
    }

    /// Returns a new payload sharing no backing memory with `self`
    /// (used to validate the "two consecutive pushes do not alias" rule).
    pub fn deep_clone(&self) -> Self {
        Payload {
            shape: self.shape.clone(),
            data: self.data.clone(),
        }
    }

    /// Identity of the backing buffer, for the aliasing check: two
    /// payloads that share the same heap allocation compare equal here.
    pub fn buffer_identity(&self) -> usize {
        self.data.as_ptr() as usize
    }

    pub fn scale(&self, factor: f64) -> Payload {
        Payload {
            shape: self.shape.clone(),
            data: self.data.iter().map(|v| v * factor).collect(),
        }
    }

    pub fn zip_with(&self, other: &Payload, f: impl Fn(f64, f64) -> f64) -> Payload {
        assert_eq!(self.shape, other.shape, "shape mismatch in zip_with");
        Payload {
            shape: self.shape.clone(),
            data: self
                .data
                .iter()
                .zip(other.data.iter())
                .map(|(a, b)| f(*a, *b))
                .collect(),
        }
    }

    /// Rough heap footprint, used for memory-limit accounting on Outputs.
    pub fn byte_size(&self) -> usize {
        self.data.len() * std::mem::size_of::<f64>()
    }

    pub fn map(&self, f: impl Fn(f64) -> f64) -> Payload {
        Payload {
            shape: self.shape.clone(),
            data: self.data.iter().map(|v| f(*v)).collect(),
        }
    }

    /// Applies the axis permutation/reversal from a
    /// [`crate::grid::GridCompat::Transform`]: `permutation[i]` names the
    /// source axis feeding output axis `i`, `reversed[i]` says whether that
    /// axis is additionally flipped. Row-major throughout, matching
    /// `GridSpec::data_shape`'s axis ordering.
    pub fn transform_axes(&self, permutation: &[usize], reversed: &[bool]) -> Payload {
        let ndim = self.shape.len();
        assert_eq!(permutation.len(), ndim, "permutation must cover every axis");
        let out_shape: Vec<usize> = permutation.iter().map(|&p| self.shape[p]).collect();
        let total: usize = out_shape.iter().product();

        let mut src_strides = vec![1usize; ndim.max(1)];
        for i in (0..ndim.saturating_sub(1)).rev() {
            src_strides[i] = src_strides[i + 1] * self.shape[i + 1];
        }
        let mut out_strides = vec![1usize; ndim.max(1)];
        for i in (0..ndim.saturating_sub(1)).rev() {
            out_strides[i] = out_strides[i + 1] * out_shape[i + 1];
        }

        let mut data = vec![0.0; total];
        let mut idx = vec![0usize; ndim];
        for (flat, slot) in data.iter_mut().enumerate() {
            let mut rem = flat;
            for d in 0..ndim {
                idx[d] = rem / out_strides[d];
                rem %= out_strides[d];
            }
            let mut src_flat = 0usize;
            for d in 0..ndim {
                let mut coord = idx[d];
                if reversed[d] {
                    coord = out_shape[d] - 1 - coord;
                }
                src_flat += coord * src_strides[permutation[d]];
            }
            *slot = self.data[src_flat];
        }
        Payload {
            shape: out_shape,
            data,
        }
    }
}
