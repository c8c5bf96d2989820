//! Flat activation cache handed from the forward call to the backward call.
//!
//! The cache crosses the framework boundary as one untyped `[M]` tensor. Both
//! engines build the same [`ArenaLayout`] from the call dimensions and use it
//! to find their regions, so region order and sizes are the whole contract.

use burn::tensor::{Tensor, backend::Backend};

/// Named regions of the LSTM activation arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Region {
    /// Input projection `x . kernel`, `[T, N, 4H]`.
    Wx,
    /// Layer-normalized input projection, `[T, N, 4H]`.
    WxNorm,
    /// Per-row `(mean, inverse_stddev)` of `Wx`, `[T, N, 2]`.
    WxNormCache,
    /// Recurrent projections `h[t-1] . recurrent_kernel`, `[T, N, 4H]`.
    Rh,
    /// Per-row `(mean, inverse_stddev)` of `Rh`, `[T, N, 2]`.
    RhNormCache,
}

impl Region {
    /// Regions in arena order.
    pub const ALL: [Region; 5] = [
        Region::Wx,
        Region::WxNorm,
        Region::WxNormCache,
        Region::Rh,
        Region::RhNormCache,
    ];

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Region::Wx => "act_Wx",
            Region::WxNorm => "act_Wx_norm",
            Region::WxNormCache => "act_Wx_norm_cache",
            Region::Rh => "act_Rh",
            Region::RhNormCache => "act_Rh_norm_cache",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct Entry {
    region: Region,
    shape: [usize; 3],
    offset: usize,
}

impl Entry {
    fn len(&self) -> usize {
        self.shape.iter().product()
    }
}

/// Offsets of shaped regions packed back to back, without padding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArenaLayout {
    entries: Vec<Entry>,
    num_elements: usize,
}

impl ArenaLayout {
    /// Pack `regions` in the given order.
    ///
    /// # Panics
    /// If a region is listed twice.
    pub fn new(regions: impl IntoIterator<Item = (Region, [usize; 3])>) -> Self {
        let mut entries: Vec<Entry> = Vec::new();
        let mut offset = 0;
        for (region, shape) in regions {
            assert!(
                entries.iter().all(|e| e.region != region),
                "region {} listed twice",
                region.name()
            );
            let entry = Entry {
                region,
                shape,
                offset,
            };
            offset += entry.len();
            entries.push(entry);
        }
        Self {
            entries,
            num_elements: offset,
        }
    }

    /// The layout used by the layer-normalized LSTM for a `[T, N, *]` call.
    #[must_use]
    pub fn lstm(time_steps: usize, batch_size: usize, hidden_size: usize) -> Self {
        let activations = [time_steps, batch_size, hidden_size * 4];
        let norm_cache = [time_steps, batch_size, 2];
        Self::new([
            (Region::Wx, activations),
            (Region::WxNorm, activations),
            (Region::WxNormCache, norm_cache),
            (Region::Rh, activations),
            (Region::RhNormCache, norm_cache),
        ])
    }

    /// Total element count of all regions.
    #[must_use]
    pub fn num_elements(&self) -> usize {
        self.num_elements
    }

    fn entry(&self, region: Region) -> &Entry {
        self.entries
            .iter()
            .find(|e| e.region == region)
            .unwrap_or_else(|| panic!("region {} is not part of this layout", region.name()))
    }

    #[must_use]
    pub fn shape(&self, region: Region) -> [usize; 3] {
        self.entry(region).shape
    }

    /// Bind the layout to a backing buffer.
    ///
    /// # Panics
    /// If the buffer is shorter than [`ArenaLayout::num_elements`].
    pub fn realize<B: Backend>(&self, buffer: Tensor<B, 1>) -> Arena<B> {
        let [len] = buffer.dims();
        assert!(
            len >= self.num_elements,
            "arena buffer holds {len} elements but the layout needs {}",
            self.num_elements
        );
        Arena {
            layout: self.clone(),
            buffer,
        }
    }

    /// Concatenate one tensor per region, in layout order, into a fresh buffer.
    ///
    /// # Panics
    /// If the regions are out of order or mis-shaped.
    pub fn pack<B: Backend>(&self, regions: Vec<(Region, Tensor<B, 3>)>) -> Tensor<B, 1> {
        assert_eq!(
            regions.len(),
            self.entries.len(),
            "expected one tensor per arena region"
        );
        let flat = regions
            .into_iter()
            .zip(&self.entries)
            .map(|((region, tensor), entry)| {
                assert_eq!(region, entry.region, "arena regions out of order");
                assert_eq!(
                    tensor.dims(),
                    entry.shape,
                    "region {} has the wrong shape",
                    region.name()
                );
                tensor.reshape([entry.len()])
            })
            .collect();
        Tensor::cat(flat, 0)
    }
}

/// A layout bound to its backing buffer.
#[derive(Clone, Debug)]
pub struct Arena<B: Backend> {
    layout: ArenaLayout,
    buffer: Tensor<B, 1>,
}

impl<B: Backend> Arena<B> {
    /// Shaped view of `region`.
    #[must_use]
    pub fn view(&self, region: Region) -> Tensor<B, 3> {
        let entry = self.layout.entry(region);
        self.buffer
            .clone()
            .slice([entry.offset..entry.offset + entry.len()])
            .reshape(entry.shape)
    }

    #[must_use]
    pub fn into_buffer(self) -> Tensor<B, 1> {
        self.buffer
    }
}

#[cfg(test)]
mod tests {
    use burn::tensor::Tensor;
    use test_case::test_case;

    use super::*;
    use crate::ReferenceBackend;

    impl ArenaLayout {
        fn offset(&self, region: Region) -> usize {
            self.entry(region).offset
        }
    }

    impl<B: Backend> Arena<B> {
        fn write(&mut self, region: Region, values: Tensor<B, 3>) {
            let entry = self.layout.entry(region);
            assert_eq!(values.dims(), entry.shape);
            self.buffer = self.buffer.clone().slice_assign(
                [entry.offset..entry.offset + entry.len()],
                values.reshape([entry.len()]),
            );
        }
    }

    #[test_case(1, 1, 1 ; "unit")]
    #[test_case(5, 3, 7 ; "odd_dims")]
    fn lstm_layout_size(t: usize, n: usize, h: usize) {
        let layout = ArenaLayout::lstm(t, n, h);
        assert_eq!(layout.num_elements(), 3 * t * n * 4 * h + 2 * t * n * 2);
        assert_eq!(layout.offset(Region::Wx), 0);
        assert_eq!(layout.offset(Region::WxNorm), t * n * 4 * h);
        assert_eq!(layout.offset(Region::WxNormCache), 2 * t * n * 4 * h);
        assert_eq!(layout.offset(Region::Rh), 2 * t * n * 4 * h + t * n * 2);
        assert_eq!(layout.offset(Region::RhNormCache), 3 * t * n * 4 * h + t * n * 2);
    }

    #[test]
    fn sentinel_round_trip() {
        let device = Default::default();
        let layout = ArenaLayout::lstm(2, 3, 2);
        let buffer = Tensor::<ReferenceBackend, 1>::zeros([layout.num_elements()], &device);
        let mut arena = layout.realize(buffer);

        for (i, region) in Region::ALL.into_iter().enumerate() {
            let shape = layout.shape(region);
            arena.write(region, Tensor::full(shape, (i + 1) as f64, &device));
        }

        for (i, region) in Region::ALL.into_iter().enumerate() {
            let values: Vec<f64> = arena.view(region).into_data().to_vec().unwrap();
            assert!(
                values.iter().all(|v| *v == (i + 1) as f64),
                "region {} was clobbered",
                region.name()
            );
        }

        // Every element belongs to exactly one region.
        let all: Vec<f64> = arena.into_buffer().into_data().to_vec().unwrap();
        assert!(all.iter().all(|v| *v != 0.0));
    }

    #[test]
    fn pack_then_view() {
        let device = Default::default();
        let layout = ArenaLayout::lstm(1, 2, 1);
        let parts = Region::ALL
            .into_iter()
            .enumerate()
            .map(|(i, region)| {
                let shape = layout.shape(region);
                (region, Tensor::full(shape, i as f64, &device))
            })
            .collect();
        let arena = layout.realize(layout.pack::<ReferenceBackend>(parts));

        let rh: Vec<f64> = arena.view(Region::Rh).into_data().to_vec().unwrap();
        assert_eq!(rh, vec![3.0; 8]);
    }

    #[test]
    #[should_panic(expected = "arena buffer holds")]
    fn realize_rejects_short_buffer() {
        let device = Default::default();
        let layout = ArenaLayout::lstm(2, 2, 2);
        let buffer = Tensor::<ReferenceBackend, 1>::zeros([layout.num_elements() - 1], &device);
        let _ = layout.realize(buffer);
    }

    #[test]
    #[should_panic(expected = "out of order")]
    fn pack_rejects_reordered_regions() {
        let device = Default::default();
        let layout = ArenaLayout::lstm(1, 1, 1);
        let mut parts: Vec<_> = Region::ALL
            .into_iter()
            .map(|region| {
                (
                    region,
                    Tensor::<ReferenceBackend, 3>::zeros(layout.shape(region), &device),
                )
            })
            .collect();
        parts.swap(0, 1);
        let _ = layout.pack(parts);
    }
}
