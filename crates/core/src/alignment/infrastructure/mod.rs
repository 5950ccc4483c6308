pub mod bilinear_warper;
