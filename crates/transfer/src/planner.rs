use crate::{TransferError, TransferLimits};

/// How a file is split into parts.
///
/// Every part but the last is exactly `part_size_bytes`; the last part holds
/// the remainder and is never larger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartPlan {
    pub part_size_bytes: u64,
    pub num_parts: u32,
    pub total_size_bytes: u64,
}

impl PartPlan {
    /// Byte offset of a 1-indexed part.
    pub fn part_offset(&self, part_number: u32) -> u64 {
        u64::from(part_number.saturating_sub(1)) * self.part_size_bytes
    }

    /// Length of a 1-indexed part. Zero for numbers outside the plan.
    pub fn part_len(&self, part_number: u32) -> u64 {
        if part_number == 0 || part_number > self.num_parts {
            return 0;
        }
        if part_number == self.num_parts {
            self.last_part_size()
        } else {
            self.part_size_bytes
        }
    }

    pub fn last_part_size(&self) -> u64 {
        self.total_size_bytes - self.part_size_bytes * u64::from(self.num_parts - 1)
    }

    /// Part numbers in upload order.
    pub fn part_numbers(&self) -> impl Iterator<Item = u32> + use<> {
        1..=self.num_parts
    }
}

/// Computes the part layout for a file of `file_size` bytes.
///
/// Files that fit in one target-size part are not split. Larger files use
/// target-size parts; when that would exceed `max_parts`, the count is
/// capped and the part size grows instead.
pub fn plan_parts(file_size: u64, limits: &TransferLimits) -> Result<PartPlan, TransferError> {
    if file_size == 0 {
        return Err(TransferError::EmptyFile);
    }

    // Zero would divide by zero below; one-byte parts are the smallest plan.
    let target = limits.target_part_size.max(1);

    if file_size <= target {
        return Ok(PartPlan {
            part_size_bytes: file_size,
            num_parts: 1,
            total_size_bytes: file_size,
        });
    }

    let max_parts = u64::from(limits.max_parts.max(1));
    let mut part_size = target;
    let mut num_parts = file_size.div_ceil(part_size);

    if num_parts > max_parts {
        part_size = file_size.div_ceil(max_parts);
        // Rounding the size up can leave the last slot empty.
        num_parts = file_size.div_ceil(part_size);
    }

    if part_size < limits.min_part_size {
        return Err(TransferError::PartTooSmall {
            part_size,
            min: limits.min_part_size,
        });
    }

    let num_parts = u32::try_from(num_parts)
        .ok()
        .filter(|&n| n <= limits.max_parts.max(1))
        .ok_or(TransferError::TooManyParts {
            parts: num_parts,
            max: limits.max_parts,
        })?;

    Ok(PartPlan {
        part_size_bytes: part_size,
        num_parts,
        total_size_bytes: file_size,
    })
}
