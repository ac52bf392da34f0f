//! JPEG decoder implementation.
//!
//! Decodes baseline sequential Huffman JPEG images (SOF0, and SOF1 with
//! 8-bit precision) into one sample plane per component. Planes keep the
//! component's own resolution: chroma is never upsampled and no color
//! conversion is applied.

use super::bit_reader::MsbBitReader;
use super::idct::{dequantize, idct_2d_integer};
use super::DecodeOptions;
use crate::color::ColorType;
use crate::error::{Error, Result};

/// JPEG markers
const SOI: u8 = 0xD8; // Start of Image
const EOI: u8 = 0xD9; // End of Image
const SOF0: u8 = 0xC0; // Baseline DCT
const SOF1: u8 = 0xC1; // Extended sequential DCT
const DHT: u8 = 0xC4; // Define Huffman Table
const JPG: u8 = 0xC8; // Reserved for extensions
const DAC: u8 = 0xCC; // Define arithmetic coding conditioning
const DQT: u8 = 0xDB; // Define Quantization Table
const DNL: u8 = 0xDC; // Define Number of Lines
const DRI: u8 = 0xDD; // Define Restart Interval
const SOS: u8 = 0xDA; // Start of Scan
const RST0: u8 = 0xD0; // Restart marker 0
const RST7: u8 = 0xD7; // Restart marker 7
const APP0: u8 = 0xE0; // Application segment 0 (JFIF)
const APP15: u8 = 0xEF; // Application segment 15
const COM: u8 = 0xFE; // Comment

/// Largest DC difference category for 8-bit samples.
const MAX_DC_CATEGORY: u8 = 11;

/// One decoded image component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plane {
    /// Component identifier from the frame header.
    pub id: u8,
    /// Horizontal sampling factor.
    pub h_sampling: u8,
    /// Vertical sampling factor.
    pub v_sampling: u8,
    /// Plane width in samples.
    pub width: u32,
    /// Plane height in samples.
    pub height: u32,
    /// Row-major samples, `width * height` bytes.
    pub samples: Vec<u8>,
}

/// Decoded JPEG image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JpegImage {
    /// Image width in pixels.
    pub width: u32,
    /// Image height in pixels.
    pub height: u32,
    /// Component planes in frame header order (Y, Cb, Cr for color).
    pub planes: Vec<Plane>,
}

impl JpegImage {
    /// True if any plane is smaller than the image.
    pub fn is_subsampled(&self) -> bool {
        self.planes
            .iter()
            .any(|p| p.width != self.width || p.height != self.height)
    }

    /// Interleave the planes into Gray or YCbCr pixels.
    ///
    /// Fails with [`Error::UnsupportedDecode`] for subsampled images, which
    /// would need upsampling first.
    pub fn interleaved(&self) -> Result<(ColorType, Vec<u8>)> {
        if self.is_subsampled() {
            return Err(Error::UnsupportedDecode(
                "subsampled chroma cannot be interleaved without upsampling".into(),
            ));
        }
        match self.planes.as_slice() {
            [gray] => Ok((ColorType::Gray, gray.samples.clone())),
            [y, cb, cr] => {
                let pixels = y
                    .samples
                    .iter()
                    .zip(&cb.samples)
                    .zip(&cr.samples)
                    .flat_map(|((&y, &cb), &cr)| [y, cb, cr])
                    .collect();
                Ok((ColorType::YCbCr, pixels))
            }
            planes => Err(Error::UnsupportedDecode(format!(
                "{} components not supported",
                planes.len()
            ))),
        }
    }
}

/// Frame component information and its sample buffer.
#[derive(Debug, Clone, Default)]
struct Component {
    id: u8,
    h_sampling: u8,
    v_sampling: u8,
    quant_table_id: u8,
    dc_table_id: u8,
    ac_table_id: u8,
    dc_pred: i32,
    /// Blocks per row of the MCU-aligned buffer.
    block_cols: usize,
    /// Block rows of the MCU-aligned buffer.
    block_rows: usize,
    /// Plane size in samples.
    width: usize,
    height: usize,
    samples: Vec<u8>,
}

impl Component {
    fn stride(&self) -> usize {
        self.block_cols * 8
    }

    fn store_block(&mut self, block_row: usize, block_col: usize, block: &[u8; 64]) {
        let stride = self.stride();
        let x = block_col * 8;
        for (by, row) in block.chunks_exact(8).enumerate() {
            let start = (block_row * 8 + by) * stride + x;
            self.samples[start..start + 8].copy_from_slice(row);
        }
    }

    fn into_plane(self) -> Plane {
        let stride = self.stride();
        let mut samples = Vec::with_capacity(self.width * self.height);
        for row in self.samples.chunks_exact(stride).take(self.height) {
            samples.extend_from_slice(&row[..self.width]);
        }
        Plane {
            id: self.id,
            h_sampling: self.h_sampling,
            v_sampling: self.v_sampling,
            width: self.width as u32,
            height: self.height as u32,
            samples,
        }
    }
}

/// Huffman decoding table.
#[derive(Debug, Clone)]
struct HuffmanTable {
    /// Fast lookup table (256 entries for 8-bit lookahead).
    lookup: [u16; 256],
    /// Values for each code.
    values: Vec<u8>,
    /// Maximum code for each bit length.
    max_code: [i32; 17],
    /// Value offset for each bit length.
    val_offset: [i32; 17],
}

impl HuffmanTable {
    /// Build a Huffman table from the DHT code-length counts and values.
    fn build(bits: &[u8; 16], values: &[u8]) -> Result<Self> {
        let mut table = HuffmanTable {
            lookup: [0; 256],
            values: values.to_vec(),
            max_code: [-1; 17],
            val_offset: [0; 17],
        };

        let mut code = 0u32;
        let mut index = 0usize;
        for len in 1..=16usize {
            let count = bits[len - 1] as usize;
            if count > 0 {
                if code + count as u32 > 1 << len {
                    return Err(Error::InvalidDecode(
                        "over-subscribed Huffman table".into(),
                    ));
                }
                table.val_offset[len] = index as i32 - code as i32;
                table.max_code[len] = (code + count as u32 - 1) as i32;

                // Fast lookup for codes <= 8 bits
                if len <= 8 {
                    let fill_bits = 8 - len;
                    for i in 0..count {
                        let base = ((code as usize) + i) << fill_bits;
                        let entry = values[index + i] as u16 | ((len as u16) << 8);
                        table.lookup[base..base + (1 << fill_bits)].fill(entry);
                    }
                }
            }
            index += count;
            code = (code + count as u32) << 1;
        }

        Ok(table)
    }

    /// Decode a symbol using the Huffman table.
    fn decode(&self, reader: &mut MsbBitReader) -> Result<u8> {
        let entry = self.lookup[reader.peek_bits(8) as usize];
        let len = (entry >> 8) as u8;
        if len > 0 {
            reader.consume(len);
            return Ok((entry & 0xFF) as u8);
        }

        // Slow path for longer codes
        let mut code = 0i32;
        for len in 1..=16 {
            code = (code << 1) | reader.read_bit() as i32;
            if code <= self.max_code[len] {
                let idx = (code + self.val_offset[len]) as usize;
                return self
                    .values
                    .get(idx)
                    .copied()
                    .ok_or_else(|| Error::InvalidDecode("invalid Huffman code".into()));
            }
        }
        Err(Error::InvalidDecode("Huffman code not found".into()))
    }
}

/// Component selector of one scan.
#[derive(Debug, Clone, Copy)]
struct ScanComponent {
    index: usize,
}

/// JPEG decoder state.
struct JpegDecoder<'a> {
    data: &'a [u8],
    pos: usize,
    max_dimension: u32,
    width: u32,
    height: u32,
    frame_seen: bool,
    components: Vec<Component>,
    quant_tables: [Option<[u16; 64]>; 4],
    dc_tables: [Option<HuffmanTable>; 4],
    ac_tables: [Option<HuffmanTable>; 4],
    restart_interval: u16,
    max_h_sampling: u8,
    max_v_sampling: u8,
    scans: usize,
}

impl<'a> JpegDecoder<'a> {
    fn new(data: &'a [u8], options: &DecodeOptions) -> Self {
        Self {
            data,
            pos: 0,
            max_dimension: options.max_dimension,
            width: 0,
            height: 0,
            frame_seen: false,
            components: Vec::new(),
            quant_tables: [None; 4],
            dc_tables: Default::default(),
            ac_tables: Default::default(),
            restart_interval: 0,
            max_h_sampling: 1,
            max_v_sampling: 1,
            scans: 0,
        }
    }

    fn decode(mut self) -> Result<JpegImage> {
        // Verify SOI marker
        if self.data.len() < 2 || self.data[0] != 0xFF || self.data[1] != SOI {
            return Err(Error::InvalidDecode("not a JPEG file".into()));
        }
        self.pos = 2;

        // Parse markers
        loop {
            if self.pos >= self.data.len() && self.scans > 0 {
                log::warn!("JPEG ends without EOI marker");
                break;
            }
            let (marker, segment) = self.read_marker()?;
            log::trace!("JPEG marker {marker:02X}, {} byte segment", segment.len());

            match marker {
                SOF0 | SOF1 => self.parse_sof(marker, segment)?,
                0xC2..=0xCF if marker != DHT && marker != JPG && marker != DAC => {
                    return Err(Error::UnsupportedDecode(format!(
                        "SOF{} JPEG not supported",
                        marker - SOF0
                    )))
                }
                DHT => self.parse_dht(segment)?,
                DQT => self.parse_dqt(segment)?,
                DRI => self.parse_dri(segment)?,
                SOS => {
                    let scan = self.parse_sos(segment)?;
                    self.decode_scan(&scan)?;
                    self.scans += 1;
                }
                DNL => log::debug!("ignoring DNL marker"),
                EOI => break,
                APP0..=APP15 | COM => {
                    // Skip application data and comments
                }
                RST0..=RST7 => log::debug!("stray RST{} marker", marker - RST0),
                _ => log::debug!("skipping marker {marker:02X}"),
            }
        }

        if self.scans == 0 {
            return Err(Error::InvalidDecode("no image data found".into()));
        }

        let width = self.width;
        let height = self.height;
        let planes = self
            .components
            .into_iter()
            .map(Component::into_plane)
            .collect();
        Ok(JpegImage {
            width,
            height,
            planes,
        })
    }

    fn read_marker(&mut self) -> Result<(u8, &'a [u8])> {
        let data = self.data;
        // Find marker
        while self.pos < self.data.len() && self.data[self.pos] != 0xFF {
            self.pos += 1;
        }

        // Skip padding 0xFF bytes
        while self.pos < self.data.len() && self.data[self.pos] == 0xFF {
            self.pos += 1;
        }

        if self.pos >= self.data.len() {
            return Err(Error::InvalidDecode("unexpected end of file".into()));
        }

        let marker = self.data[self.pos];
        self.pos += 1;

        // Markers without payload
        match marker {
            SOI | EOI | RST0..=RST7 => return Ok((marker, &data[..0])),
            _ => {}
        }

        // Read segment length
        if self.pos + 2 > self.data.len() {
            return Err(Error::InvalidDecode("truncated marker".into()));
        }
        let length = u16::from_be_bytes([self.data[self.pos], self.data[self.pos + 1]]) as usize;
        self.pos += 2;

        if length < 2 || self.pos + length - 2 > self.data.len() {
            return Err(Error::InvalidDecode("invalid marker length".into()));
        }

        let segment = &data[self.pos..self.pos + length - 2];
        self.pos += length - 2;

        Ok((marker, segment))
    }

    fn parse_sof(&mut self, marker: u8, segment: &[u8]) -> Result<()> {
        if self.frame_seen {
            return Err(Error::InvalidDecode("duplicate SOF marker".into()));
        }
        if segment.len() < 6 {
            return Err(Error::InvalidDecode("invalid SOF length".into()));
        }

        let precision = segment[0];
        if precision != 8 {
            return Err(Error::UnsupportedDecode(format!(
                "{precision}-bit precision not supported"
            )));
        }

        self.height = u16::from_be_bytes([segment[1], segment[2]]) as u32;
        self.width = u16::from_be_bytes([segment[3], segment[4]]) as u32;

        if self.height == 0 {
            return Err(Error::UnsupportedDecode(
                "image height defined by DNL not supported".into(),
            ));
        }
        if self.width == 0 {
            return Err(Error::InvalidDimensions {
                width: self.width,
                height: self.height,
            });
        }
        if self.width > self.max_dimension || self.height > self.max_dimension {
            return Err(Error::ImageTooLarge {
                width: self.width,
                height: self.height,
                max: self.max_dimension,
            });
        }

        let num_components = segment[5] as usize;
        if num_components != 1 && num_components != 3 {
            return Err(Error::UnsupportedDecode(format!(
                "{num_components} components not supported"
            )));
        }

        if segment.len() < 6 + num_components * 3 {
            return Err(Error::InvalidDecode("truncated SOF components".into()));
        }

        self.components.clear();
        for i in 0..num_components {
            let offset = 6 + i * 3;
            let id = segment[offset];
            let sampling = segment[offset + 1];
            let h_sampling = (sampling >> 4) & 0x0F;
            let v_sampling = sampling & 0x0F;

            // Baseline allows factors 1-4
            if !(1..=4).contains(&h_sampling) || !(1..=4).contains(&v_sampling) {
                return Err(Error::InvalidDecode(format!(
                    "invalid sampling factors {h_sampling}x{v_sampling} for component {id}"
                )));
            }

            let quant_table_id = segment[offset + 2];
            if quant_table_id > 3 {
                return Err(Error::InvalidDecode(format!(
                    "invalid quantization table ID {quant_table_id} for component {id}"
                )));
            }

            if self.components.iter().any(|c| c.id == id) {
                return Err(Error::InvalidDecode(format!(
                    "duplicate component ID {id}"
                )));
            }

            self.max_h_sampling = self.max_h_sampling.max(h_sampling);
            self.max_v_sampling = self.max_v_sampling.max(v_sampling);

            self.components.push(Component {
                id,
                h_sampling,
                v_sampling,
                quant_table_id,
                ..Default::default()
            });
        }

        // Size buffers to whole MCUs
        let width = self.width as usize;
        let height = self.height as usize;
        let max_h = self.max_h_sampling as usize;
        let max_v = self.max_v_sampling as usize;
        let mcu_cols = width.div_ceil(max_h * 8);
        let mcu_rows = height.div_ceil(max_v * 8);
        for comp in &mut self.components {
            let h = comp.h_sampling as usize;
            let v = comp.v_sampling as usize;
            comp.width = (width * h).div_ceil(max_h);
            comp.height = (height * v).div_ceil(max_v);
            comp.block_cols = mcu_cols * h;
            comp.block_rows = mcu_rows * v;
            comp.samples = vec![128; comp.block_cols * comp.block_rows * 64];
        }

        log::debug!(
            "JPEG SOF{} {}x{}, {} components, max sampling {}x{}",
            marker - SOF0,
            self.width,
            self.height,
            num_components,
            self.max_h_sampling,
            self.max_v_sampling
        );

        self.frame_seen = true;
        Ok(())
    }

    fn parse_dht(&mut self, segment: &[u8]) -> Result<()> {
        let mut offset = 0;
        while offset < segment.len() {
            let info = segment[offset];
            let table_class = (info >> 4) & 0x0F; // 0 = DC, 1 = AC
            let table_id = (info & 0x0F) as usize;

            if table_class > 1 || table_id > 3 {
                return Err(Error::InvalidDecode("invalid Huffman table ID".into()));
            }

            offset += 1;
            if offset + 16 > segment.len() {
                return Err(Error::InvalidDecode("truncated DHT".into()));
            }

            let mut bits = [0u8; 16];
            bits.copy_from_slice(&segment[offset..offset + 16]);
            offset += 16;

            let num_values: usize = bits.iter().map(|&b| b as usize).sum();
            if num_values > 256 {
                return Err(Error::InvalidDecode("too many Huffman values".into()));
            }
            if offset + num_values > segment.len() {
                return Err(Error::InvalidDecode("truncated DHT values".into()));
            }

            let values = &segment[offset..offset + num_values];
            offset += num_values;

            let table = HuffmanTable::build(&bits, values)?;
            if table_class == 0 {
                self.dc_tables[table_id] = Some(table);
            } else {
                self.ac_tables[table_id] = Some(table);
            }
        }

        Ok(())
    }

    fn parse_dqt(&mut self, segment: &[u8]) -> Result<()> {
        let mut offset = 0;
        while offset < segment.len() {
            let info = segment[offset];
            let precision = (info >> 4) & 0x0F;
            let table_id = (info & 0x0F) as usize;

            if table_id > 3 {
                return Err(Error::InvalidDecode("invalid quantization table ID".into()));
            }

            offset += 1;

            let mut table = [0u16; 64];
            match precision {
                0 => {
                    // 8-bit precision
                    if offset + 64 > segment.len() {
                        return Err(Error::InvalidDecode("truncated DQT".into()));
                    }
                    for (q, &byte) in table.iter_mut().zip(&segment[offset..offset + 64]) {
                        *q = byte as u16;
                    }
                    offset += 64;
                }
                1 => {
                    // 16-bit precision
                    if offset + 128 > segment.len() {
                        return Err(Error::InvalidDecode("truncated DQT".into()));
                    }
                    for (q, pair) in table
                        .iter_mut()
                        .zip(segment[offset..offset + 128].chunks_exact(2))
                    {
                        *q = u16::from_be_bytes([pair[0], pair[1]]);
                    }
                    offset += 128;
                }
                _ => {
                    return Err(Error::InvalidDecode(format!(
                        "invalid quantization table precision {precision}"
                    )))
                }
            }
            self.quant_tables[table_id] = Some(table);
        }

        Ok(())
    }

    fn parse_dri(&mut self, segment: &[u8]) -> Result<()> {
        if segment.len() != 2 {
            return Err(Error::InvalidDecode("invalid DRI length".into()));
        }

        self.restart_interval = u16::from_be_bytes([segment[0], segment[1]]);

        Ok(())
    }

    fn parse_sos(&mut self, segment: &[u8]) -> Result<Vec<ScanComponent>> {
        if !self.frame_seen {
            return Err(Error::InvalidDecode("SOS before SOF".into()));
        }
        if segment.is_empty() {
            return Err(Error::InvalidDecode("empty SOS segment".into()));
        }

        let num_components = segment[0] as usize;
        if num_components == 0 || num_components > self.components.len() {
            return Err(Error::InvalidDecode("SOS component count mismatch".into()));
        }
        if segment.len() < 1 + num_components * 2 + 3 {
            return Err(Error::InvalidDecode("truncated SOS segment".into()));
        }

        // Read component selectors
        let mut scan = Vec::with_capacity(num_components);
        for i in 0..num_components {
            let offset = 1 + i * 2;
            let component_id = segment[offset];
            let tables = segment[offset + 1];
            let dc_table_id = (tables >> 4) & 0x0F;
            let ac_table_id = tables & 0x0F;

            // Validate Huffman table IDs (must be 0-3)
            if dc_table_id > 3 {
                return Err(Error::InvalidDecode(format!(
                    "invalid DC Huffman table ID {dc_table_id} for component {component_id}"
                )));
            }
            if ac_table_id > 3 {
                return Err(Error::InvalidDecode(format!(
                    "invalid AC Huffman table ID {ac_table_id} for component {component_id}"
                )));
            }

            let index = self
                .components
                .iter()
                .position(|c| c.id == component_id)
                .ok_or_else(|| {
                    Error::InvalidDecode(format!("SOS references unknown component {component_id}"))
                })?;
            if scan.iter().any(|s: &ScanComponent| s.index == index) {
                return Err(Error::InvalidDecode(format!(
                    "component {component_id} listed twice in SOS"
                )));
            }

            let comp = &mut self.components[index];
            comp.dc_table_id = dc_table_id;
            comp.ac_table_id = ac_table_id;
            scan.push(ScanComponent { index });
        }

        // Spectral selection and approximation must describe a full
        // sequential scan.
        let tail = &segment[1 + num_components * 2..];
        if tail[0] != 0 || tail[1] != 63 || tail[2] != 0 {
            log::debug!(
                "ignoring spectral selection {}..={} and approximation {:02X} in baseline scan",
                tail[0],
                tail[1],
                tail[2]
            );
        }

        Ok(scan)
    }

    fn decode_scan(&mut self, scan: &[ScanComponent]) -> Result<()> {
        for sc in scan {
            let comp = &self.components[sc.index];
            if self.quant_tables[comp.quant_table_id as usize].is_none() {
                return Err(Error::InvalidDecode(format!(
                    "missing quantization table {} for component {}",
                    comp.quant_table_id, comp.id
                )));
            }
            if self.dc_tables[comp.dc_table_id as usize].is_none()
                || self.ac_tables[comp.ac_table_id as usize].is_none()
            {
                return Err(Error::InvalidDecode(format!(
                    "missing Huffman table for component {}",
                    comp.id
                )));
            }
        }

        // A single-component scan is non-interleaved: one block per MCU
        // over the component's own block grid.
        let (mcu_cols, mcu_rows) = if let [single] = scan {
            let comp = &self.components[single.index];
            (comp.width.div_ceil(8), comp.height.div_ceil(8))
        } else {
            (
                (self.width as usize).div_ceil(self.max_h_sampling as usize * 8),
                (self.height as usize).div_ceil(self.max_v_sampling as usize * 8),
            )
        };
        let interleaved = scan.len() > 1;

        let data = self.data;
        let mut reader = MsbBitReader::new(&data[self.pos..]);
        for sc in scan {
            self.components[sc.index].dc_pred = 0;
        }

        let restart_interval = self.restart_interval as usize;
        let total_mcus = mcu_cols * mcu_rows;
        log::trace!(
            "JPEG scan: {} components, {mcu_cols}x{mcu_rows} MCUs, restart interval {restart_interval}",
            scan.len()
        );

        'mcu_loop: for mcu in 0..total_mcus {
            // Handle restart markers
            if restart_interval > 0 && mcu > 0 && mcu % restart_interval == 0 {
                if !reader.restart() {
                    log::warn!("expected restart marker before MCU {mcu}");
                }
                for sc in scan {
                    self.components[sc.index].dc_pred = 0;
                }
            }

            let mcu_x = mcu % mcu_cols;
            let mcu_y = mcu / mcu_cols;

            for sc in scan {
                let (blocks_h, blocks_v) = if interleaved {
                    let comp = &self.components[sc.index];
                    (comp.h_sampling as usize, comp.v_sampling as usize)
                } else {
                    (1, 1)
                };

                for block_y in 0..blocks_v {
                    for block_x in 0..blocks_h {
                        let coeffs = match self.decode_block(&mut reader, sc.index) {
                            Ok(coeffs) => coeffs,
                            // Encoders pad the last byte with 1-bits, which
                            // rarely form a valid code
                            Err(err) if reader.reached_end() => {
                                log::warn!(
                                    "entropy data truncated at MCU {mcu} of {total_mcus}: {err}"
                                );
                                break 'mcu_loop;
                            }
                            Err(err) => return Err(err),
                        };

                        let comp = &self.components[sc.index];
                        let Some(qtable) = &self.quant_tables[comp.quant_table_id as usize]
                        else {
                            return Err(Error::InvalidDecode("missing quantization table".into()));
                        };
                        let block = idct_2d_integer(&dequantize(&coeffs, qtable));

                        let block_row = mcu_y * blocks_v + block_y;
                        let block_col = mcu_x * blocks_h + block_x;
                        self.components[sc.index].store_block(block_row, block_col, &block);
                    }
                }
            }
        }

        if reader.is_overrun() {
            log::warn!("entropy data truncated; remaining bits padded with zeros");
        }

        // Continue after the entropy-coded segment
        let resume = reader.position();
        self.pos += resume + find_entropy_end(&data[self.pos + resume..]);
        Ok(())
    }

    /// Decode one block's coefficients in zigzag order.
    fn decode_block(&mut self, reader: &mut MsbBitReader, index: usize) -> Result<[i32; 64]> {
        let comp = &self.components[index];
        let (Some(dc_table), Some(ac_table)) = (
            &self.dc_tables[comp.dc_table_id as usize],
            &self.ac_tables[comp.ac_table_id as usize],
        ) else {
            return Err(Error::InvalidDecode("missing Huffman table".into()));
        };

        let mut coeffs = [0i32; 64];

        // Decode DC coefficient
        let category = dc_table.decode(reader)?;
        if category > MAX_DC_CATEGORY {
            return Err(Error::InvalidDecode(format!(
                "invalid DC difference category {category}"
            )));
        }
        let diff = read_amplitude(reader, category);

        // Decode AC coefficients
        let mut k = 1;
        while k < 64 {
            let symbol = ac_table.decode(reader)?;

            if symbol == 0 {
                // EOB - remaining coefficients are zero
                break;
            }

            let run = (symbol >> 4) & 0x0F;
            let size = symbol & 0x0F;

            if symbol == 0xF0 {
                // ZRL - skip 16 zeros
                k += 16;
                continue;
            }

            k += run as usize;
            if k >= 64 || size == 0 {
                return Err(Error::InvalidDecode(format!(
                    "invalid AC symbol {symbol:02X} at coefficient {k}"
                )));
            }

            coeffs[k] = read_amplitude(reader, size);
            k += 1;
        }
        if k > 64 {
            return Err(Error::InvalidDecode("AC zero run past end of block".into()));
        }

        let comp = &mut self.components[index];
        comp.dc_pred = comp.dc_pred.wrapping_add(diff);
        coeffs[0] = comp.dc_pred;
        Ok(coeffs)
    }
}

/// Find the end of entropy-coded data (before next marker).
fn find_entropy_end(data: &[u8]) -> usize {
    if data.len() < 2 {
        return data.len();
    }
    let mut i = 0;
    while i < data.len() - 1 {
        if data[i] == 0xFF && data[i + 1] != 0x00 && data[i + 1] != 0xFF {
            // Found a marker (that's not stuffed 0xFF00 or padding 0xFFFF)
            if (RST0..=RST7).contains(&data[i + 1]) {
                // Restart marker - skip it
                i += 2;
                continue;
            }
            return i;
        }
        i += 1;
    }
    data.len()
}

/// Read a signed amplitude value of the given size.
fn read_amplitude(reader: &mut MsbBitReader, size: u8) -> i32 {
    if size == 0 {
        return 0;
    }
    let bits = reader.read_bits(size) as i32;
    // Sign extension for negative values
    let threshold = 1 << (size - 1);
    if bits < threshold {
        bits - (2 * threshold - 1)
    } else {
        bits
    }
}

/// Decode a JPEG with default options.
pub fn decode_jpeg(data: &[u8]) -> Result<JpegImage> {
    decode_jpeg_with_options(data, &DecodeOptions::default())
}

/// Decode a JPEG into its component planes.
pub fn decode_jpeg_with_options(data: &[u8], options: &DecodeOptions) -> Result<JpegImage> {
    JpegDecoder::new(data, options).decode()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(marker: u8, payload: &[u8]) -> Vec<u8> {
        let mut out = vec![0xFF, marker];
        out.extend_from_slice(&((payload.len() + 2) as u16).to_be_bytes());
        out.extend_from_slice(payload);
        out
    }

    fn dqt(id: u8, value: u8) -> Vec<u8> {
        let mut payload = vec![id];
        payload.extend_from_slice(&[value; 64]);
        segment(DQT, &payload)
    }

    /// DC table: '00' -> category 0, '01' -> category 2.
    /// AC table: '0' -> EOB.
    fn dht_tables() -> Vec<u8> {
        let mut dc = vec![0x00];
        let mut bits = [0u8; 16];
        bits[1] = 2;
        dc.extend_from_slice(&bits);
        dc.extend_from_slice(&[0, 2]);

        let mut ac = vec![0x10];
        let mut bits = [0u8; 16];
        bits[0] = 1;
        ac.extend_from_slice(&bits);
        ac.push(0x00);

        let mut out = segment(DHT, &dc);
        out.extend(segment(DHT, &ac));
        out
    }

    fn sof(marker: u8, width: u16, height: u16, comps: &[(u8, u8)]) -> Vec<u8> {
        let mut payload = vec![8];
        payload.extend_from_slice(&height.to_be_bytes());
        payload.extend_from_slice(&width.to_be_bytes());
        payload.push(comps.len() as u8);
        for &(id, sampling) in comps {
            payload.extend_from_slice(&[id, sampling, 0]);
        }
        segment(marker, &payload)
    }

    fn sos(ids: &[u8]) -> Vec<u8> {
        let mut payload = vec![ids.len() as u8];
        for &id in ids {
            payload.extend_from_slice(&[id, 0x00]);
        }
        payload.extend_from_slice(&[0, 63, 0]);
        segment(SOS, &payload)
    }

    fn jpeg(frame: Vec<u8>, extra: &[Vec<u8>], scans: &[(Vec<u8>, Vec<u8>)]) -> Vec<u8> {
        let mut data = vec![0xFF, SOI];
        data.extend(dqt(0, 8));
        data.extend(dht_tables());
        for seg in extra {
            data.extend_from_slice(seg);
        }
        data.extend(frame);
        for (header, entropy) in scans {
            data.extend_from_slice(header);
            data.extend_from_slice(entropy);
        }
        data.extend_from_slice(&[0xFF, EOI]);
        data
    }

    #[test]
    fn test_flat_gray_block() {
        // DC '00', EOB '0', padding 1s
        let data = jpeg(sof(SOF0, 8, 8, &[(1, 0x11)]), &[], &[(sos(&[1]), vec![0x1F])]);
        let image = decode_jpeg(&data).unwrap();
        assert_eq!((image.width, image.height), (8, 8));
        assert_eq!(image.planes.len(), 1);
        assert!(image.planes[0].samples.iter().all(|&s| s == 128));
    }

    #[test]
    fn test_dc_difference() {
        // DC '01' + amplitude '11' (+3), EOB '0': 0111 0111
        // 3 * quant 8 = 24 -> +3 after the IDCT scaling
        let data = jpeg(sof(SOF0, 8, 8, &[(1, 0x11)]), &[], &[(sos(&[1]), vec![0x77])]);
        let image = decode_jpeg(&data).unwrap();
        assert!(image.planes[0].samples.iter().all(|&s| s == 131));
    }

    #[test]
    fn test_dc_prediction_across_blocks() {
        // Block 1: +3, block 2: -3 ('01' + '00', EOB)
        // 01110 01000 + padding: 0111 0010 0011 1111
        let data = jpeg(
            sof(SOF0, 16, 8, &[(1, 0x11)]),
            &[],
            &[(sos(&[1]), vec![0x72, 0x3F])],
        );
        let plane = &decode_jpeg(&data).unwrap().planes[0];
        for row in plane.samples.chunks_exact(16) {
            assert!(row[..8].iter().all(|&s| s == 131));
            assert!(row[8..].iter().all(|&s| s == 128));
        }
    }

    #[test]
    fn test_restart_interval_resets_prediction() {
        let dri = segment(DRI, &[0, 1]);
        let data = jpeg(
            sof(SOF0, 16, 8, &[(1, 0x11)]),
            &[dri],
            &[(sos(&[1]), vec![0x77, 0xFF, RST0, 0x77])],
        );
        let plane = &decode_jpeg(&data).unwrap().planes[0];
        // Without the reset the second block would be +6
        assert!(plane.samples.iter().all(|&s| s == 131));
    }

    #[test]
    fn test_cropped_plane() {
        let data = jpeg(sof(SOF0, 5, 3, &[(1, 0x11)]), &[], &[(sos(&[1]), vec![0x77])]);
        let image = decode_jpeg(&data).unwrap();
        let plane = &image.planes[0];
        assert_eq!((plane.width, plane.height), (5, 3));
        assert_eq!(plane.samples, vec![131; 15]);
        let (color_type, pixels) = image.interleaved().unwrap();
        assert_eq!(color_type, ColorType::Gray);
        assert_eq!(pixels.len(), 15);
    }

    #[test]
    fn test_sof1_matches_sof0() {
        let baseline = jpeg(sof(SOF0, 8, 8, &[(1, 0x11)]), &[], &[(sos(&[1]), vec![0x77])]);
        let extended = jpeg(sof(SOF1, 8, 8, &[(1, 0x11)]), &[], &[(sos(&[1]), vec![0x77])]);
        assert_eq!(decode_jpeg(&baseline).unwrap(), decode_jpeg(&extended).unwrap());
    }

    #[test]
    fn test_ycbcr_444() {
        // Three blocks of DC '00' + EOB '0': 000 000 000 + padding
        let comps = [(1, 0x11), (2, 0x11), (3, 0x11)];
        let data = jpeg(
            sof(SOF0, 8, 8, &comps),
            &[],
            &[(sos(&[1, 2, 3]), vec![0x00, 0x7F])],
        );
        let image = decode_jpeg(&data).unwrap();
        assert!(!image.is_subsampled());
        let (color_type, pixels) = image.interleaved().unwrap();
        assert_eq!(color_type, ColorType::YCbCr);
        assert_eq!(pixels, vec![128; 8 * 8 * 3]);
    }

    #[test]
    fn test_ycbcr_420_planes() {
        // MCU: four Y blocks, one Cb, one Cr
        let comps = [(1, 0x22), (2, 0x11), (3, 0x11)];
        let data = jpeg(
            sof(SOF0, 16, 16, &comps),
            &[],
            &[(sos(&[1, 2, 3]), vec![0x00, 0x00, 0x0F])],
        );
        let image = decode_jpeg(&data).unwrap();
        assert!(image.is_subsampled());
        assert_eq!((image.planes[0].width, image.planes[0].height), (16, 16));
        assert_eq!((image.planes[1].width, image.planes[1].height), (8, 8));
        assert_eq!((image.planes[2].h_sampling, image.planes[2].v_sampling), (1, 1));
        assert!(matches!(
            image.interleaved(),
            Err(Error::UnsupportedDecode(_))
        ));
    }

    #[test]
    fn test_subsampled_odd_size() {
        // 4:2:0 at 17x9: chroma planes round up
        let comps = [(1, 0x22), (2, 0x11), (3, 0x11)];
        let data = jpeg(sof(SOF0, 17, 9, &comps), &[], &[(sos(&[1, 2, 3]), Vec::new())]);
        let image = decode_jpeg(&data).unwrap();
        assert_eq!((image.planes[0].width, image.planes[0].height), (17, 9));
        assert_eq!((image.planes[1].width, image.planes[1].height), (9, 5));
        assert_eq!(image.planes[1].samples.len(), 45);
    }

    #[test]
    fn test_non_interleaved_scans() {
        let comps = [(1, 0x11), (2, 0x11), (3, 0x11)];
        let data = jpeg(
            sof(SOF0, 8, 8, &comps),
            &[],
            &[
                (sos(&[1]), vec![0x77]),
                (sos(&[2]), vec![0x1F]),
                (sos(&[3]), vec![0x77]),
            ],
        );
        let image = decode_jpeg(&data).unwrap();
        assert!(image.planes[0].samples.iter().all(|&s| s == 131));
        assert!(image.planes[1].samples.iter().all(|&s| s == 128));
        assert!(image.planes[2].samples.iter().all(|&s| s == 131));
    }

    #[test]
    fn test_scan_selects_components_by_id() {
        let comps = [(7, 0x11), (9, 0x11), (4, 0x11)];
        let data = jpeg(
            sof(SOF0, 8, 8, &comps),
            &[],
            // 7: DC 0, EOB; 4: DC +3, EOB
            &[(sos(&[9]), vec![0x77]), (sos(&[7, 4]), vec![0x0E])],
        );
        let image = decode_jpeg(&data).unwrap();
        assert_eq!(image.planes[0].id, 7);
        assert!(image.planes[0].samples.iter().all(|&s| s == 128));
        assert!(image.planes[1].samples.iter().all(|&s| s == 131));
        assert_eq!(image.planes[2].id, 4);
        assert!(image.planes[2].samples.iter().all(|&s| s == 131));
    }

    #[test]
    fn test_truncated_entropy_data_is_tolerated() {
        let mut data = jpeg(sof(SOF0, 64, 64, &[(1, 0x11)]), &[], &[(sos(&[1]), vec![0x77])]);
        // Drop EOI
        data.truncate(data.len() - 2);
        let image = decode_jpeg(&data).unwrap();
        assert_eq!(image.planes[0].samples.len(), 64 * 64);
        assert_eq!(image.planes[0].samples[0], 131);
    }

    #[test]
    fn test_scan_ending_in_one_bit_padding() {
        // One block of data, then 1-bit padding that is not a valid DC code
        let data = jpeg(sof(SOF0, 16, 8, &[(1, 0x11)]), &[], &[(sos(&[1]), vec![0x77])]);
        let image = decode_jpeg(&data).unwrap();
        let samples = &image.planes[0].samples;
        assert!((0..8).all(|y| samples[y * 16] == 131));
        assert!((0..8).all(|y| samples[y * 16 + 8] == 128));
    }

    #[test]
    fn test_byte_stuffing_in_scan() {
        // DC table with a single 8-bit code for category 8, so the
        // amplitude byte is aligned: 0000 0000 | 1111 1111 (stuffed) | EOB
        let mut dc = vec![0x00];
        let mut bits = [0u8; 16];
        bits[7] = 1;
        dc.extend_from_slice(&bits);
        dc.push(8);

        let data = jpeg(
            sof(SOF0, 8, 8, &[(1, 0x11)]),
            &[segment(DHT, &dc)],
            &[(sos(&[1]), vec![0x00, 0xFF, 0x00, 0x7F])],
        );
        let image = decode_jpeg(&data).unwrap();
        // +255 * 8 saturates; losing the stuffed byte would give -255
        assert!(image.planes[0].samples.iter().all(|&s| s == 255));
    }

    #[test]
    fn test_app_and_comment_segments_skipped() {
        let app = segment(APP0, b"JFIF\0\x01\x01\0\0\x01\0\x01\0\0");
        let com = segment(COM, b"hello");
        let data = jpeg(
            sof(SOF0, 8, 8, &[(1, 0x11)]),
            &[app, com],
            &[(sos(&[1]), vec![0x77])],
        );
        assert!(decode_jpeg(&data).is_ok());
    }

    #[test]
    fn test_progressive_unsupported() {
        let data = jpeg(sof(0xC2, 8, 8, &[(1, 0x11)]), &[], &[]);
        assert!(matches!(
            decode_jpeg(&data),
            Err(Error::UnsupportedDecode(_))
        ));
    }

    #[test]
    fn test_arithmetic_unsupported() {
        let data = jpeg(sof(0xC9, 8, 8, &[(1, 0x11)]), &[], &[]);
        assert!(matches!(
            decode_jpeg(&data),
            Err(Error::UnsupportedDecode(_))
        ));
    }

    #[test]
    fn test_twelve_bit_unsupported() {
        let mut frame = sof(SOF1, 8, 8, &[(1, 0x11)]);
        frame[4] = 12;
        let data = jpeg(frame, &[], &[(sos(&[1]), vec![0x77])]);
        assert!(matches!(
            decode_jpeg(&data),
            Err(Error::UnsupportedDecode(_))
        ));
    }

    #[test]
    fn test_zero_width() {
        let data = jpeg(sof(SOF0, 0, 8, &[(1, 0x11)]), &[], &[]);
        assert_eq!(
            decode_jpeg(&data).unwrap_err(),
            Error::InvalidDimensions {
                width: 0,
                height: 8
            }
        );
    }

    #[test]
    fn test_max_dimension() {
        let data = jpeg(sof(SOF0, 100, 8, &[(1, 0x11)]), &[], &[]);
        let options = DecodeOptions {
            max_dimension: 64,
            ..DecodeOptions::default()
        };
        assert!(matches!(
            decode_jpeg_with_options(&data, &options),
            Err(Error::ImageTooLarge { .. })
        ));
    }

    #[test]
    fn test_invalid_sampling_factor() {
        let data = jpeg(sof(SOF0, 8, 8, &[(1, 0x01)]), &[], &[]);
        assert!(matches!(decode_jpeg(&data), Err(Error::InvalidDecode(_))));
    }

    #[test]
    fn test_invalid_quant_table_id() {
        let mut frame = sof(SOF0, 8, 8, &[(1, 0x11)]);
        let last = frame.len() - 1;
        frame[last] = 4;
        let data = jpeg(frame, &[], &[]);
        assert!(matches!(decode_jpeg(&data), Err(Error::InvalidDecode(_))));
    }

    #[test]
    fn test_invalid_huffman_table_id_in_sos() {
        let mut scan = sos(&[1]);
        // Tables byte of the single selector
        scan[6] = 0x50;
        let data = jpeg(sof(SOF0, 8, 8, &[(1, 0x11)]), &[], &[(scan, vec![0x1F])]);
        assert!(matches!(decode_jpeg(&data), Err(Error::InvalidDecode(_))));
    }

    #[test]
    fn test_missing_huffman_table() {
        let mut scan = sos(&[1]);
        scan[6] = 0x11;
        let data = jpeg(sof(SOF0, 8, 8, &[(1, 0x11)]), &[], &[(scan, vec![0x1F])]);
        assert!(matches!(decode_jpeg(&data), Err(Error::InvalidDecode(_))));
    }

    #[test]
    fn test_unknown_scan_component() {
        let data = jpeg(sof(SOF0, 8, 8, &[(1, 0x11)]), &[], &[(sos(&[2]), vec![0x1F])]);
        assert!(matches!(decode_jpeg(&data), Err(Error::InvalidDecode(_))));
    }

    #[test]
    fn test_sos_before_sof() {
        let mut data = vec![0xFF, SOI];
        data.extend(dqt(0, 1));
        data.extend(dht_tables());
        data.extend(sos(&[1]));
        data.extend_from_slice(&[0x1F, 0xFF, EOI]);
        assert!(matches!(decode_jpeg(&data), Err(Error::InvalidDecode(_))));
    }

    #[test]
    fn test_no_scan() {
        let data = jpeg(sof(SOF0, 8, 8, &[(1, 0x11)]), &[], &[]);
        assert!(matches!(decode_jpeg(&data), Err(Error::InvalidDecode(_))));
    }

    #[test]
    fn test_not_jpeg() {
        assert!(decode_jpeg(b"\x89PNG").is_err());
        assert!(decode_jpeg(&[]).is_err());
    }

    #[test]
    fn test_huffman_table_rejects_oversubscription() {
        let mut bits = [0u8; 16];
        bits[0] = 3;
        assert!(HuffmanTable::build(&bits, &[0, 1, 2]).is_err());
    }

    #[test]
    fn test_huffman_long_codes() {
        // One code of each length 1..=16 except the last two share length 16
        let mut bits = [1u8; 16];
        bits[15] = 2;
        let values: Vec<u8> = (0..17).collect();
        let table = HuffmanTable::build(&bits, &values).unwrap();

        // Length 10 code is nine 1s then a 0
        let data = [0xFF, 0x00, 0xBF];
        let mut reader = MsbBitReader::new(&data);
        assert_eq!(table.decode(&mut reader).unwrap(), 9);
    }

    #[test]
    fn test_read_amplitude() {
        let data = [0b1100_0000];
        let mut reader = MsbBitReader::new(&data);
        assert_eq!(read_amplitude(&mut reader, 1), 1);
        assert_eq!(read_amplitude(&mut reader, 1), 1);
        assert_eq!(read_amplitude(&mut reader, 2), -3);
        assert_eq!(read_amplitude(&mut reader, 0), 0);
    }

    #[test]
    fn test_find_entropy_end() {
        assert_eq!(find_entropy_end(&[0x12, 0xFF, 0x00, 0x34, 0xFF, 0xD9]), 4);
        assert_eq!(find_entropy_end(&[0xFF, 0xD3, 0x00, 0xFF, 0xC4]), 3);
        assert_eq!(find_entropy_end(&[0x12, 0x34]), 2);
    }
}
