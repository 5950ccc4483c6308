/// Fixed kernels used for sizes up to 7 when no sigma is given.
const SMALL_KERNELS: [&[f32]; 4] = [
    &[1.0],
    &[0.25, 0.5, 0.25],
    &[0.0625, 0.25, 0.375, 0.25, 0.0625],
    &[0.03125, 0.109375, 0.21875, 0.28125, 0.21875, 0.109375, 0.03125],
];

/// Sigma implied by an odd kernel size: `0.3 * ((k - 1) / 2 - 1) + 0.8`.
pub fn sigma_for_size(kernel_size: usize) -> f64 {
    0.3 * ((kernel_size as f64 - 1.0) * 0.5 - 1.0) + 0.8
}

/// Precompute a 1D Gaussian kernel of the given size, following OpenCV's
/// `getGaussianKernel` with a non-positive sigma.
///
/// `kernel_size` must be odd and >= 1.
pub fn gaussian_kernel_1d(kernel_size: usize) -> Vec<f32> {
    debug_assert!(kernel_size >= 1 && kernel_size % 2 == 1);
    if kernel_size <= 7 {
        return SMALL_KERNELS[kernel_size / 2].to_vec();
    }
    let sigma = sigma_for_size(kernel_size);
    let half = (kernel_size / 2) as f64;
    let mut kernel: Vec<f64> = (0..kernel_size)
        .map(|i| {
            let x = i as f64 - half;
            (-x * x / (2.0 * sigma * sigma)).exp()
        })
        .collect();
    let sum: f64 = kernel.iter().sum();
    for v in &mut kernel {
        *v /= sum;
    }
    kernel.iter().map(|&v| v as f32).collect()
}

/// Separable Gaussian blur of a single-channel plane, clamping at the edges.
pub fn blur_plane(data: &mut [f32], width: usize, height: usize, kernel: &[f32]) {
    let kernel_size = kernel.len();
    if kernel_size <= 1 || width == 0 || height == 0 {
        return;
    }
    let half = kernel_size as isize / 2;
    let mut temp = vec![0.0f32; width * height];

    // Horizontal pass: data → temp
    for y in 0..height {
        let row = &data[y * width..(y + 1) * width];
        for x in 0..width {
            let mut sum = 0.0f32;
            for (k, &w) in kernel.iter().enumerate() {
                let sx = (x as isize + k as isize - half).clamp(0, width as isize - 1) as usize;
                sum += row[sx] * w;
            }
            temp[y * width + x] = sum;
        }
    }

    // Vertical pass: temp → data
    for y in 0..height {
        for x in 0..width {
            let mut sum = 0.0f32;
            for (k, &w) in kernel.iter().enumerate() {
                let sy = (y as isize + k as isize - half).clamp(0, height as isize - 1) as usize;
                sum += temp[sy * width + x] * w;
            }
            data[y * width + x] = sum;
        }
    }
}
